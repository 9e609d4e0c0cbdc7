use turnstile_model::ModelProviderError;

/// Errors that terminate the current user turn.
///
/// Failures of individual tool calls never show up here, they are
/// reported back to the model as tool results instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model produced neither text nor tool calls.
    #[error("the model returned an empty response")]
    EmptyResponse,
    /// The model call itself failed.
    #[error("model transport failed: {0}")]
    Transport(Box<dyn ModelProviderError>),
}

impl From<Box<dyn ModelProviderError>> for Error {
    #[inline]
    fn from(value: Box<dyn ModelProviderError>) -> Self {
        Error::Transport(value)
    }
}
