//! Built-in tools offered through the `workspace` provider.

mod glob;
mod read_file;

pub use glob::{GlobInput, GlobTool};
pub use read_file::{ReadFileInput, ReadFileTool, ReadRange};
use turnstile_core::tool::LocalProvider;

/// The provider name of the built-in tools.
pub const WORKSPACE_PROVIDER: &str = "workspace";

/// Returns a provider with all built-in tools, exposed to the model as
/// `workspace__glob` and `workspace__read_file`.
pub fn workspace_provider() -> LocalProvider {
    LocalProvider::new(WORKSPACE_PROVIDER)
        .with_tool(GlobTool::new())
        .with_tool(ReadFileTool::new())
}
