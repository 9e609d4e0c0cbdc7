use async_trait::async_trait;
use serde_json::Value;
use turnstile_model::ModelTool;

use super::{Error, ToolResult};

/// The name of the providerless tool that reads a skill.
pub const READ_SKILL_TOOL: &str = "read_skill";

/// A collaborator exposing a namespaced set of invocable tools.
///
/// A provider goes through `connect`, any number of `list_tools` and
/// `invoke` calls, and finally `disconnect`. Names returned by
/// `list_tools` and passed to `invoke` are local names, without the
/// provider prefix.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Returns the namespace of this provider. It must not contain the
    /// namespace separator.
    fn name(&self) -> &str;

    /// Establishes the connection to the provider.
    async fn connect(&mut self) -> Result<(), Error>;

    /// Lists the tools offered by this provider.
    async fn list_tools(&self) -> Result<Vec<ModelTool>, Error>;

    /// Invokes a tool by its local name.
    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult;

    /// Tears the connection down.
    async fn disconnect(&mut self) -> Result<(), Error>;
}

/// A library of skills, which are instruction documents the model can
/// read on demand.
#[async_trait]
pub trait SkillSource: Send + Sync {
    /// Returns a summary of all skills for the system prompt, or an empty
    /// string if there is nothing to announce.
    fn summary(&self) -> String;

    /// Returns the definition of [`READ_SKILL_TOOL`], or `None` if there
    /// are no skills to read.
    fn tool_definition(&self) -> Option<ModelTool>;

    /// Returns the full content of a skill.
    ///
    /// Fails with [`ErrorKind::SkillNotFound`](super::ErrorKind) for an
    /// unknown name.
    async fn read(&self, name: &str) -> Result<String, Error>;

    /// Returns guidance rendered from the skills matching the user input,
    /// if any.
    fn matched_context(&self, _input: &str) -> Option<String> {
        None
    }
}
