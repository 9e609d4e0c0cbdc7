use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use sse_stream::SseStream;
use tokio::sync::Mutex;

use super::protocol::{Message, Notification, Request};
use super::{DEFAULT_REQUEST_TIMEOUT, McpError, Transport};

const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// The streamable HTTP transport.
///
/// Every message is POSTed to the endpoint. Responses are either plain
/// JSON or an event stream whose `data` fields carry JSON-RPC messages.
/// The session id assigned by the server is sent back on later requests.
pub struct HttpTransport {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
    request_timeout: Duration,
    next_id: AtomicU64,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    /// Creates a transport for the endpoint `url`.
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            headers: BTreeMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            next_id: AtomicU64::new(1),
            session_id: Mutex::new(None),
        }
    }

    /// Adds headers sent with every request.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets how long a request may take.
    #[inline]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    async fn decorate(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(session_id) = self.session_id.lock().await.as_deref() {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        builder.timeout(self.request_timeout)
    }

    /// Posts a message and collects the messages of the response. An
    /// event stream is read until the response to `id` arrives.
    async fn post<T: Serialize>(
        &self,
        message: &T,
        id: Option<u64>,
    ) -> Result<Vec<Message>, McpError> {
        let builder = self
            .client
            .post(&self.url)
            .header(ACCEPT, ACCEPT_BOTH)
            .json(message);
        let resp = self.decorate(builder).await.send().await?;

        if let Some(session_id) = resp
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            let mut current = self.session_id.lock().await;
            if current.as_deref() != Some(session_id) {
                debug!("MCP session established: {session_id}");
                *current = Some(session_id.to_owned());
            }
        }

        let resp = check_status(resp).await?;
        let is_event_stream = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        if is_event_stream {
            return read_event_stream(resp.bytes_stream(), id).await;
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(vec![]);
        }
        parse_payload(&body)
    }
}

async fn check_status(resp: Response) -> Result<Response, McpError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(McpError::Status {
        status: status.as_u16(),
        body,
    })
}

fn parse_payload(payload: &str) -> Result<Vec<Message>, McpError> {
    match serde_json::from_str(payload)? {
        Value::Array(batch) => batch
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .collect(),
        value => Ok(vec![serde_json::from_value(value)?]),
    }
}

/// Collects the JSON-RPC messages carried by the `data` of the events,
/// stopping after the response to `id`.
async fn read_event_stream<S, E>(
    stream: S,
    id: Option<u64>,
) -> Result<Vec<Message>, McpError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: StdError + Send + Sync + 'static,
{
    let mut events = pin!(SseStream::from_byte_stream(stream));
    let mut messages = vec![];
    while let Some(event) = events.next().await {
        let event =
            event.map_err(|err| McpError::EventStream(err.to_string()))?;
        let Some(data) = event.data.filter(|data| !data.trim().is_empty())
        else {
            continue;
        };
        let batch = parse_payload(&data)?;
        let done = id.is_some_and(|id| {
            batch.iter().any(|message| message.response_id() == Some(id))
        });
        messages.extend(batch);
        if done {
            break;
        }
    }
    Ok(messages)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&mut self) -> Result<(), McpError> {
        *self.session_id.get_mut() = None;
        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("posting request {id}: {method}");
        let request = Request::new(id, method, params);
        let messages = self.post(&request, Some(id)).await?;
        messages
            .into_iter()
            .find(|message| message.response_id() == Some(id))
            .ok_or(McpError::MissingResponse(id))?
            .into_result()
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        self.post(&Notification::new(method, params), None).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.session_id.get_mut().is_none() {
            return Ok(());
        }
        let builder = self.client.delete(&self.url);
        let resp = self.decorate(builder).await.send().await?;
        *self.session_id.get_mut() = None;
        // Servers may not allow clients to end sessions.
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        check_status(resp).await.map(|_| ())
    }
}
