use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// A complete message, i.e. one turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ModelMessage {
    /// The system instructions.
    System {
        /// Instruction text.
        content: String,
    },
    /// A user input text.
    User {
        /// Input text.
        content: String,
    },
    /// An assistant turn, which carries text, tool calls, or both.
    Assistant(AssistantMessage),
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Creates a system message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        ModelMessage::System {
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        ModelMessage::User {
            content: content.into(),
        }
    }

    /// Creates a tool result message answering the tool call `id`.
    #[inline]
    pub fn tool<S1: Into<String>, S2: Into<String>>(
        id: S1,
        content: S2,
    ) -> Self {
        ModelMessage::Tool(ToolCallResult {
            id: id.into(),
            content: content.into(),
        })
    }
}

/// The message produced by one model call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Text content of the message, `None` if the model only called tools.
    pub content: Option<String>,
    /// Tool calls requested by the model, in the order they were emitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantMessage {
    /// Creates a text-only assistant message.
    #[inline]
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
        }
    }

    /// Returns the text content, or an empty string.
    #[inline]
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The kind of the call, which is a function call for all known
    /// providers.
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    /// The name of the tool to call.
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

impl ToolCallRequest {
    /// Creates a function call request.
    #[inline]
    pub fn function<S1, S2, S3>(id: S1, name: S2, arguments: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            id: id.into(),
            kind: ToolCallKind::Function,
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The kind of a tool call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolCallKind {
    /// A plain function call.
    #[default]
    Function,
    /// A kind this crate doesn't know about.
    Unrecognized(String),
}

impl From<String> for ToolCallKind {
    fn from(value: String) -> Self {
        if value == "function" {
            ToolCallKind::Function
        } else {
            ToolCallKind::Unrecognized(value)
        }
    }
}

impl From<ToolCallKind> for String {
    fn from(value: ToolCallKind) -> Self {
        match value {
            ToolCallKind::Function => "function".to_owned(),
            ToolCallKind::Unrecognized(kind) => kind,
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
