use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::protocol::{Message, Notification, Request};
use super::{DEFAULT_REQUEST_TIMEOUT, McpError, Transport};

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Connection {
    async fn send<T: Serialize>(
        &mut self,
        message: &T,
    ) -> Result<(), McpError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Reads until the response to `id` arrives. Everything else the server
    /// writes in between is skipped.
    async fn read_response(&mut self, id: u64) -> Result<Value, McpError> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(McpError::Closed);
            };
            if line.trim().is_empty() {
                continue;
            }
            let message: Message = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(err) => {
                    debug!("skipping non JSON-RPC output: {err}");
                    continue;
                }
            };
            match message.response_id() {
                Some(response_id) if response_id == id => {
                    return message.into_result();
                }
                Some(response_id) => {
                    warn!("skipping response to unknown request {response_id}")
                }
                None => {
                    trace!("skipping server message {:?}", message.method())
                }
            }
        }
    }
}

/// Runs an MCP server as a child process and exchanges newline-delimited
/// JSON-RPC messages over its stdin and stdout.
///
/// Requests are sent one at a time. The child is killed on
/// [`Transport::close`] or when the transport is dropped.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    envs: BTreeMap<String, String>,
    request_timeout: Duration,
    next_id: AtomicU64,
    connection: Mutex<Option<Connection>>,
}

impl StdioTransport {
    /// Creates a transport running `command`.
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            envs: BTreeMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            next_id: AtomicU64::new(1),
            connection: Mutex::new(None),
        }
    }

    /// Appends arguments of the command.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds environment variables of the child.
    pub fn with_envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.envs.extend(envs);
        self
    }

    /// Sets how long a request may take.
    #[inline]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn open(&mut self) -> Result<(), McpError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let (Some(stdin), Some(stdout)) =
            (child.stdin.take(), child.stdout.take())
        else {
            return Err(McpError::Closed);
        };
        debug!("spawned MCP server {}, pid: {:?}", self.command, child.id());

        *self.connection.get_mut() = Some(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        });
        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let mut connection = self.connection.lock().await;
        let connection = connection.as_mut().ok_or(McpError::NotConnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("sending request {id}: {method}");
        connection.send(&Request::new(id, method, params)).await?;
        timeout(self.request_timeout, connection.read_response(id))
            .await
            .map_err(|_| McpError::Timeout(method.to_owned()))?
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        let mut connection = self.connection.lock().await;
        let connection = connection.as_mut().ok_or(McpError::NotConnected)?;
        connection.send(&Notification::new(method, params)).await
    }

    async fn close(&mut self) -> Result<(), McpError> {
        let Some(Connection {
            mut child, stdin, ..
        }) = self.connection.get_mut().take()
        else {
            return Ok(());
        };
        drop(stdin);
        if child.try_wait()?.is_none() {
            child.kill().await?;
        }
        debug!("MCP server {} stopped", self.command);
        Ok(())
    }
}
