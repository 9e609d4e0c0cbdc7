//! Reduction of streamed fragments into complete assistant turns.

use std::collections::BTreeMap;

use turnstile_model::{
    AssistantMessage, StreamFragment, ToolCallDelta, ToolCallKind,
    ToolCallRequest,
};

use crate::Error;

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PartialToolCall {
    fn merge(&mut self, delta: ToolCallDelta) {
        if self.id.is_none() {
            self.id = delta.id.filter(|id| !id.is_empty());
        }
        if self.kind.is_none() {
            self.kind = delta.kind.filter(|kind| !kind.is_empty());
        }
        // Some providers resend the name once arguments have started, the
        // latest non-empty one is the authoritative value.
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            self.name = Some(name);
        }
        if let Some(arguments) = delta.arguments {
            self.arguments.push_str(&arguments);
        }
    }

    fn finish(self) -> ToolCallRequest {
        ToolCallRequest {
            id: self.id.unwrap_or_default(),
            kind: self.kind.map(ToolCallKind::from).unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            arguments: self.arguments,
        }
    }
}

/// Accumulates the fragments of one model call.
///
/// Tool call deltas are keyed by their `index`, which is treated as a
/// sparse key: indices may start anywhere and have gaps. Arguments are
/// concatenated in arrival order and never parsed here.
#[derive(Debug, Default)]
pub struct Assembler {
    text: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

impl Assembler {
    /// Creates an empty assembler.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduces one fragment into the pending turn.
    pub fn push(&mut self, fragment: StreamFragment) {
        if let Some(content) = fragment.content {
            self.text.push_str(&content);
        }
        for delta in fragment.tool_calls {
            self.tool_calls.entry(delta.index).or_default().merge(delta);
        }
    }

    /// Returns the text received so far.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Builds the assistant turn out of everything pushed so far.
    ///
    /// Fails with [`Error::EmptyResponse`] when neither text nor tool calls
    /// were received.
    pub fn finish(self) -> Result<AssistantMessage, Error> {
        if self.text.is_empty() && self.tool_calls.is_empty() {
            return Err(Error::EmptyResponse);
        }
        let content = (!self.text.is_empty()).then_some(self.text);
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(PartialToolCall::finish)
            .collect();
        Ok(AssistantMessage {
            content,
            tool_calls,
        })
    }
}

/// Assembles a complete sequence of fragments in one go.
pub fn assemble<I>(fragments: I) -> Result<AssistantMessage, Error>
where
    I: IntoIterator<Item = StreamFragment>,
{
    let mut assembler = Assembler::new();
    for fragment in fragments {
        assembler.push(fragment);
    }
    assembler.finish()
}
