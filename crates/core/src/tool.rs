//! Tool call supports.
//!
//! Tools are grouped by [`ToolProvider`]s. Every tool is exposed to the
//! model as `<provider>__<tool>`, and the [`Registry`] routes a call back
//! to the provider owning it. A single optional [`SkillSource`] adds the
//! providerless [`READ_SKILL_TOOL`].

mod error;
mod local;
mod provider;
mod registry;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use local::LocalProvider;
pub use provider::{READ_SKILL_TOOL, SkillSource, ToolProvider};
pub use registry::{Registry, Resolved, split_tool_name};

/// The separator between the provider name and the local tool name.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// The result of a tool call.
pub type ToolResult = Result<Value, Error>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the working directory or the
/// current user. To do this, make the context an immutable state of the tool,
/// which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool, without any provider prefix.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
