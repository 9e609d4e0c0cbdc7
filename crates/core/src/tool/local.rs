use std::collections::BTreeMap;
use std::future::ready;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Instrument;
use turnstile_model::ModelTool;

use super::{Error, Tool, ToolProvider, ToolResult};

trait ToolObject: Send + Sync + 'static {
    fn definition(&self) -> ModelTool;

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

struct AnyTool<T: Tool>(T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.0.name().to_owned(),
            description: self.0.description().to_owned(),
            parameters: self.0.parameter_schema().clone(),
        }
    }

    #[inline]
    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };
        Box::pin(self.0.execute(input))
    }
}

/// An in-process provider built from typed [`Tool`]s.
///
/// Connecting and disconnecting are no-ops.
pub struct LocalProvider {
    name: String,
    tools: BTreeMap<String, Box<dyn ToolObject>>,
}

impl LocalProvider {
    /// Creates an empty provider with the given namespace.
    #[inline]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            tools: BTreeMap::new(),
        }
    }

    /// Adds a tool. A tool with the same name is replaced.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools
            .insert(tool.name().to_owned(), Box::new(AnyTool(tool)));
        self
    }
}

#[async_trait]
impl ToolProvider for LocalProvider {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ModelTool>, Error> {
        Ok(self.tools.values().map(|tool| tool.definition()).collect())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return Err(Error::execution_error()
                .with_reason(format!("tool not found: {name}")));
        };
        trace!("executing local tool {name} with args: {arguments:?}");
        tool.execute(arguments)
            .instrument(debug_span!("tool execute"))
            .await
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
