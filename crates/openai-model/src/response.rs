use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use turnstile_model::{ErrorKind, ModelResponse, StreamFragment};

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::ChatCompletionChunk;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFragment = Result<(Option<StreamFragment>, Sse), Error>;

pin_project! {
    /// A streamed chat completion. Each SSE event is converted into one
    /// [`StreamFragment`]; assembling them is left to the caller.
    pub struct OpenAIResponse {
        next_fragment_fut: Option<PinnedFuture<NextFragment>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        Self {
            next_fragment_fut: Some(Box::pin(next_fragment(sse))),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFragment>, Self::Error>> {
        let this = self.project();
        let Some(next_fragment_fut) = this.next_fragment_fut else {
            return Poll::Ready(Ok(None));
        };
        let (fragment, sse) = match ready!(next_fragment_fut.as_mut().poll(cx)) {
            Ok((Some(fragment), sse)) => (fragment, sse),
            Ok((None, _)) => {
                *this.next_fragment_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_fragment_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The stream may still have more data to pull, create a new future
        // for the next fragment.
        *this.next_fragment_fut = Some(Box::pin(next_fragment(sse)));

        Poll::Ready(Ok(Some(fragment)))
    }
}

async fn next_fragment(mut sse: Sse) -> NextFragment {
    loop {
        let sse_event = match sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok((None, sse)),
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(err.0, ErrorKind::Network));
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream payload",
                    ErrorKind::Protocol,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            return Ok((None, sse));
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Protocol))?;
        if let Some(err) = &chunk.error {
            return Err(Error::new(err.message.clone(), ErrorKind::Other));
        }

        // Usage and finish chunks carry nothing to assemble.
        if let Some(fragment) = chunk.into_fragment() {
            return Ok((Some(fragment), sse));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use turnstile_model::ModelProviderError;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        chunks: Chunks,
    ) -> Result<Vec<StreamFragment>, crate::Error> {
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(chunks)));
        let mut fragments = vec![];
        while let Some(fragment) =
            poll_fn(|cx| resp.as_mut().poll_next_fragment(cx)).await?
        {
            fragments.push(fragment);
        }
        Ok(fragments)
    }

    #[tokio::test]
    async fn test_fixture_fragments() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(include_bytes!(
                "../fixtures/test_response.txt"
            ))]
            .into(),
        );
        let fragments = collect(chunks).await.unwrap();

        let text: String =
            fragments.iter().filter_map(|f| f.content.as_deref()).collect();
        assert_eq!(text, "Let me check both cities.");

        let mut calls: Vec<(u32, String)> = vec![];
        for delta in fragments.iter().flat_map(|f| &f.tool_calls) {
            match calls.iter_mut().find(|(idx, _)| *idx == delta.index) {
                Some((_, args)) => {
                    args.push_str(delta.arguments.as_deref().unwrap_or(""))
                }
                None => calls.push((
                    delta.index,
                    delta.arguments.clone().unwrap_or_default(),
                )),
            }
        }
        assert_eq!(
            calls,
            vec![
                (0, r#"{"city":"Paris"}"#.to_owned()),
                (1, r#"{"city":"Tokyo"}"#.to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_chunk() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: {not json}\n\n")].into(),
        );
        let err = collect(chunks).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_error_chunk() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            )]
            .into(),
        );
        let err = collect(chunks).await.unwrap_err();
        assert_eq!(err.message(), "overloaded");
    }

    #[tokio::test]
    async fn test_stream_without_done() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
            )]
            .into(),
        );
        let fragments = collect(chunks).await.unwrap();
        assert_eq!(fragments, vec![StreamFragment::text("hi")]);
    }
}
