use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use tracing::Instrument;
use turnstile_model::{
    AssistantMessage, ModelProvider, ModelRequest, ModelResponse,
};

use crate::Error;
use crate::assembler::Assembler;

type SendRequestResult = Result<AssistantMessage, Error>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
/// Receives text deltas while a response is streaming.
pub type DeltaFn = Box<dyn Fn(&str) + Send + Sync + 'static>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, DeltaFn) -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that drives one model call to
/// completion and provides a type-erased interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits until the whole response is assembled.
    ///
    /// `on_delta` receives every text delta as it arrives.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> SendRequestResult {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: DeltaFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Error::Transport(Box::new(err)));
        }
    };

    trace!("start receiving fragments");

    let mut assembler = Assembler::new();
    let mut pinned_resp = pin!(resp);
    loop {
        let fragment_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_fragment(cx)).await;
        let fragment = match fragment_or_err {
            Ok(Some(fragment)) => fragment,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Error::Transport(Box::new(err)));
            }
        };
        trace!("got a fragment: {fragment:?}");

        if let Some(content) = fragment.content.as_deref() {
            on_delta(content);
        }
        assembler.push(fragment);
    }

    trace!("finished a request");
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use turnstile_model::{ErrorKind, ModelMessage};
    use turnstile_test_model::{
        PresetFailure, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn hi_request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::text("How are you?"));

        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let deltas = Arc::new(AtomicUsize::new(0));
            let msg = model_client
                .send_request(hi_request(), {
                    let deltas = Arc::clone(&deltas);
                    move |_| {
                        deltas.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .await
                .unwrap();
            assert_eq!(msg, AssistantMessage::text("How are you?"));
            assert_eq!(deltas.load(Ordering::Relaxed), 3);
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_client = ModelClient::new(TestModelProvider::default());
        let resp_or_err = model_client.send_request(hi_request(), |_| {}).await;
        assert!(matches!(resp_or_err, Err(Error::Transport(_))));

        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(
            PresetResponse::text("cut").with_failure(PresetFailure::Stream),
        );
        let model_client = ModelClient::new(model_provider);
        match model_client.send_request(hi_request(), |_| {}).await {
            Err(Error::Transport(err)) => {
                assert_eq!(err.kind(), ErrorKind::Network)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_response() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::default());
        let model_client = ModelClient::new(model_provider);
        let resp_or_err = model_client.send_request(hi_request(), |_| {}).await;
        assert!(matches!(resp_or_err, Err(Error::EmptyResponse)));
    }
}
