use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The connection failed or was interrupted mid-stream.
    Network,
    /// The provider answered with something that violates its protocol.
    Protocol,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::Protocol => write!(f, "protocol error"),
            ErrorKind::Other => write!(f, "other error"),
        }
    }
}
