use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The arguments of a tool call are not valid JSON.
    MalformedArguments,
    /// The tool name is not of the `<provider>__<tool>` form.
    UnknownToolFormat,
    /// No connected provider matches the tool name.
    UnknownProvider,
    /// The requested skill doesn't exist.
    SkillNotFound,
    /// The input provided to the tool was invalid.
    InvalidInput,
    /// Error occurred while executing the tool.
    ExecutionError,
    /// The provider could not be connected.
    ConnectFailure,
    /// The call is not supported by the provider.
    Unsupported,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MalformedArguments => write!(f, "Malformed arguments"),
            ErrorKind::UnknownToolFormat => write!(f, "Unknown tool format"),
            ErrorKind::UnknownProvider => write!(f, "Unknown provider"),
            ErrorKind::SkillNotFound => write!(f, "Skill not found"),
            ErrorKind::InvalidInput => write!(f, "Invalid input"),
            ErrorKind::ExecutionError => write!(f, "Execution error"),
            ErrorKind::ConnectFailure => write!(f, "Connect failure"),
            ErrorKind::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// Describes a tool call error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

macro_rules! constructors {
    ($($(#[$meta:meta])* $fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $fn_name() -> Self {
                Self::new(ErrorKind::$kind)
            }
        )*
    };
}

impl Error {
    /// Creates a new error of the given kind without a reason.
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, reason: None }
    }

    constructors! {
        /// Creates a new error with the `MalformedArguments` kind.
        malformed_arguments => MalformedArguments,
        /// Creates a new error with the `UnknownToolFormat` kind.
        unknown_tool_format => UnknownToolFormat,
        /// Creates a new error with the `UnknownProvider` kind.
        unknown_provider => UnknownProvider,
        /// Creates a new error with the `SkillNotFound` kind.
        skill_not_found => SkillNotFound,
        /// Creates a new error with the `InvalidInput` kind.
        invalid_input => InvalidInput,
        /// Creates a new error with the `ExecutionError` kind.
        execution_error => ExecutionError,
        /// Creates a new error with the `ConnectFailure` kind.
        connect_failure => ConnectFailure,
        /// Creates a new error with the `Unsupported` kind.
        unsupported => Unsupported,
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl StdError for Error {}
