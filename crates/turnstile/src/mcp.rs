//! Tool providers backed by MCP servers.
//!
//! A [`McpProvider`] speaks JSON-RPC 2.0 over a [`Transport`], either a
//! child process ([`StdioTransport`]) or the streamable HTTP transport
//! ([`HttpTransport`]). Connecting performs the `initialize` handshake,
//! tools are listed with `tools/list` and called with `tools/call`.

mod http;
mod protocol;
mod stdio;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::Instrument;
use turnstile_core::tool::{Error as ToolError, ToolProvider, ToolResult};
use turnstile_model::ModelTool;

use crate::config::McpServerConfig;
pub use http::HttpTransport;
use protocol::{ToolsPage, call_error, initialize_params};
pub use protocol::PROTOCOL_VERSION;
pub use stdio::StdioTransport;

/// How long a single request may take.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// A provider spawning an MCP server as a child process.
pub type StdioMcpProvider = McpProvider<StdioTransport>;

/// A provider talking to an MCP server over HTTP.
pub type HttpMcpProvider = McpProvider<HttpTransport>;

/// Errors of the MCP transports.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The transport is not open.
    #[error("not connected")]
    NotConnected,
    /// Talking to the child process failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with an error status.
    #[error("server responded with status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
    /// A message is not valid JSON-RPC.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
    /// The server did not answer in time.
    #[error("request {0} timed out")]
    Timeout(String),
    /// An event stream response could not be read.
    #[error("invalid event stream: {0}")]
    EventStream(String),
    /// The server went away.
    #[error("the server closed the connection")]
    Closed,
    /// The server answered without a response to the request.
    #[error("no response to request {0}")]
    MissingResponse(u64),
    /// The server answered with a JSON-RPC error.
    #[error("{message} (code {code})")]
    #[allow(missing_docs)]
    Rpc { code: i64, message: String },
}

/// A channel carrying JSON-RPC messages to a server and back.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Prepares the channel, e.g. spawns the server process.
    async fn open(&mut self) -> Result<(), McpError>;

    /// Sends a request and waits for the matching response.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError>;

    /// Sends a notification.
    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError>;

    /// Tears the channel down.
    async fn close(&mut self) -> Result<(), McpError>;
}

/// A [`ToolProvider`] exposing the tools of an MCP server.
pub struct McpProvider<T> {
    name: String,
    transport: T,
}

impl<T: Transport> McpProvider<T> {
    /// Creates a provider with the given namespace.
    #[inline]
    pub fn new<S: Into<String>>(name: S, transport: T) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    async fn handshake(&self) -> Result<(), McpError> {
        let result = self
            .transport
            .request("initialize", Some(initialize_params()))
            .await?;
        let server_info = result.get("serverInfo").unwrap_or(&Value::Null);
        debug!("server {} initialized: {server_info}", self.name);
        self.transport
            .notify("notifications/initialized", None)
            .await
    }
}

/// Creates the provider described by `config`.
pub fn provider_from_config(
    config: &McpServerConfig,
) -> Box<dyn ToolProvider> {
    match config {
        McpServerConfig::Stdio {
            name,
            command,
            args,
            env,
        } => Box::new(McpProvider::new(
            name.clone(),
            StdioTransport::new(command)
                .with_args(args.iter().cloned())
                .with_envs(env.clone()),
        )),
        McpServerConfig::Http { name, url, headers } => Box::new(
            McpProvider::new(
                name.clone(),
                HttpTransport::new(url).with_headers(headers.clone()),
            ),
        ),
    }
}

#[async_trait]
impl<T: Transport> ToolProvider for McpProvider<T> {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ToolError> {
        self.transport.open().await.map_err(connect_failure)?;
        if let Err(err) = self.handshake().await {
            if let Err(err) = self.transport.close().await {
                debug!("failed to close transport of {}: {err}", self.name);
            }
            return Err(connect_failure(err));
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ModelTool>, ToolError> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let params =
                cursor.take().map(|cursor| json!({ "cursor": cursor }));
            let result = self
                .transport
                .request("tools/list", params)
                .await
                .map_err(execution_error)?;
            let page: ToolsPage =
                serde_json::from_value(result).map_err(|err| {
                    let reason = format!("invalid tools/list result: {err}");
                    ToolError::execution_error().with_reason(reason)
                })?;
            tools.extend(page.tools.into_iter().map(ModelTool::from));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .transport
            .request("tools/call", Some(params))
            .instrument(debug_span!("mcp call", server = %self.name))
            .await
            .map_err(execution_error)?;
        match call_error(&result) {
            Some(reason) => {
                Err(ToolError::execution_error().with_reason(reason))
            }
            None => Ok(result),
        }
    }

    async fn disconnect(&mut self) -> Result<(), ToolError> {
        self.transport.close().await.map_err(execution_error)
    }
}

fn connect_failure(err: McpError) -> ToolError {
    ToolError::connect_failure().with_reason(err.to_string())
}

fn execution_error(err: McpError) -> ToolError {
    ToolError::execution_error().with_reason(err.to_string())
}
