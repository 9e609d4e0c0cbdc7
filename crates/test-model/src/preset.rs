use serde::{Deserialize, Serialize};
use turnstile_model::{StreamFragment, ToolCallDelta};

/// The fragments in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetFragment {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta(ToolCallDelta),
    /// A fragment delivered as is, e.g. one carrying several deltas.
    #[serde(rename = "raw")]
    Raw(StreamFragment),
}

impl From<PresetFragment> for StreamFragment {
    fn from(value: PresetFragment) -> Self {
        match value {
            PresetFragment::Text(text) => StreamFragment::text(text),
            PresetFragment::ToolCallDelta(delta) => {
                StreamFragment::tool_call(delta)
            }
            PresetFragment::Raw(fragment) => fragment,
        }
    }
}

/// Where a preset response fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    /// The request is rejected before any fragment is produced.
    Request,
    /// The stream breaks after all preset fragments are delivered.
    Stream,
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Fragments in this response.
    pub fragments: Vec<PresetFragment>,
    /// If set, the response fails instead of completing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified fragments.
    #[inline]
    pub fn with_fragments(fragments: impl Into<Vec<PresetFragment>>) -> Self {
        Self {
            fragments: fragments.into(),
            failure: None,
        }
    }

    /// Creates a text-only response, streamed word by word.
    pub fn text(content: &str) -> Self {
        Self::with_fragments(
            content
                .split_inclusive(' ')
                .map(|word| PresetFragment::Text(word.to_owned()))
                .collect::<Vec<_>>(),
        )
    }

    /// Appends a complete function call at `index`. The arguments are
    /// streamed in two halves to exercise reassembly.
    pub fn with_tool_call(
        mut self,
        index: u32,
        id: &str,
        name: &str,
        arguments: &str,
    ) -> Self {
        let split = arguments
            .char_indices()
            .map(|(idx, _)| idx)
            .nth(arguments.chars().count() / 2)
            .unwrap_or(arguments.len());
        let (head, tail) = arguments.split_at(split);
        self.fragments.push(PresetFragment::ToolCallDelta(
            ToolCallDelta::at(index)
                .with_id(id)
                .with_kind("function")
                .with_name(name)
                .with_arguments(head),
        ));
        self.fragments.push(PresetFragment::ToolCallDelta(
            ToolCallDelta::at(index).with_arguments(tail),
        ));
        self
    }

    /// Makes this response fail at the given point.
    #[inline]
    pub fn with_failure(mut self, failure: PresetFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::text("I have left a message for you.")
            .with_tool_call(
                0,
                "call_1",
                "fs__write_file",
                r#"{"filename":"message.txt"}"#,
            )
            .with_failure(PresetFailure::Stream);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_tool_call_split() {
        let response =
            PresetResponse::default().with_tool_call(3, "id", "a__b", "{}");
        let fragments: Vec<StreamFragment> =
            response.fragments.into_iter().map(Into::into).collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].tool_calls[0].arguments.as_deref(), Some("{"));
        assert_eq!(fragments[1].tool_calls[0].arguments.as_deref(), Some("}"));
        assert_eq!(fragments[1].tool_calls[0].index, 3);
    }
}
