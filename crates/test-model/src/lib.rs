//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use turnstile_model::{
    ErrorKind, ModelMessage, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, StreamFragment,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    fragments: Vec<StreamFragment>,
    failure: Option<PresetFailure>,
    fragment_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFragment>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            if let Some(fragment) = this.fragments.get(this.fragment_idx) {
                this.fragment_idx += 1;
                return Poll::Ready(Ok(Some(fragment.clone())));
            }
            if this.failure.take() == Some(PresetFailure::Stream) {
                return Poll::Ready(Err(Error {
                    message: "stream interrupted",
                    kind: ErrorKind::Network,
                }));
            }
            // Also covers calls after completion.
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_fragment(cx)
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how
/// the model should respond to a request. The step is selected by the
/// number of assistant turns already in the request, so the provider
/// itself stays stateless. If there are no enough steps in the script,
/// an error will be returned.
///
/// Every received request is recorded and can be inspected with
/// [`TestModelProvider::requests`].
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Vec<PresetResponse>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    /// Appends the response for the next model call.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script.push(preset);
    }

    /// Sets the delay between two fragments.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let step_idx = req
            .messages
            .iter()
            .filter(|msg| matches!(msg, ModelMessage::Assistant(_)))
            .count();
        let result = match self.script.get(step_idx) {
            None => Err(Error {
                message: "no enough steps",
                kind: ErrorKind::RateLimitExceeded,
            }),
            Some(preset) if preset.failure == Some(PresetFailure::Request) => {
                Err(Error {
                    message: "request rejected",
                    kind: ErrorKind::Other,
                })
            }
            Some(preset) => Ok(TestModelResponse {
                fragments: preset
                    .fragments
                    .iter()
                    .cloned()
                    .map(Into::into)
                    .collect(),
                failure: preset.failure,
                fragment_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use turnstile_model::{AssistantMessage, ModelTool};

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> Result<(String, String), Error> {
        let mut resp = pin!(resp);
        let mut text = String::new();
        let mut arguments = String::new();
        while let Some(fragment) =
            poll_fn(|cx| resp.as_mut().poll_next_fragment(cx)).await?
        {
            if let Some(content) = fragment.content {
                text.push_str(&content);
            }
            for delta in fragment.tool_calls {
                arguments.push_str(delta.arguments.as_deref().unwrap_or(""));
            }
        }
        Ok((text, arguments))
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("Hello, world!"));
        provider.add_response(
            PresetResponse::text("Sure, let me take a look.").with_tool_call(
                0,
                "tool:1",
                "fs__read_file",
                r#"{"filename":"todo.txt"}"#,
            ),
        );

        let mut req = ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![ModelTool {
                name: "fs__read_file".to_owned(),
                description: "Reads a file".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "The name of the file to read"
                        }
                    }
                }),
            }],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (text, _) = collect_response(resp).await.unwrap();
        assert_eq!(text, "Hello, world!");

        req.messages
            .push(ModelMessage::Assistant(AssistantMessage::text(text)));
        req.messages.push(ModelMessage::user("Check my todo"));
        let resp = provider.send_request(&req).await.unwrap();
        let (text, arguments) = collect_response(resp).await.unwrap();
        assert_eq!(text, "Sure, let me take a look.");
        assert_eq!(arguments, r#"{"filename":"todo.txt"}"#);

        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(
            PresetResponse::text("partial").with_failure(PresetFailure::Stream),
        );
        let req = ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let err = collect_response(resp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let mut provider = TestModelProvider::default();
        provider.add_response(
            PresetResponse::text("never").with_failure(PresetFailure::Request),
        );
        assert!(provider.send_request(&req).await.is_err());

        let provider = TestModelProvider::default();
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    }
}
