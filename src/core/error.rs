use std::fmt;

/// Taxonomy from the error handling design: each kind maps to one failure
/// class callers are expected to handle differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File missing, permission denied, disk full.
    IoUnavailable,
    /// OOM, or fd-limit saturated with every descriptor pinned.
    ResourceExhausted,
    /// Corrupt vocab entry, bad varbyte, parameters version mismatch.
    FormatInvalid,
    /// Term absent from vocabulary, fileno unregistered.
    NotFound,
    /// Filename too long, limit exceeded, duplicate type registration.
    InvalidArgument,
    /// Changing a registered type's template; creating a file that exists.
    ConflictingState,
    /// A cooperative cancellation flag was observed.
    UserCanceled,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context)
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context)
    }

    pub fn format_invalid(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::FormatInvalid, context)
    }

    pub fn resource_exhausted(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::ResourceExhausted, context)
    }

    pub fn conflicting_state(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::ConflictingState, context)
    }

    pub fn user_canceled() -> Self {
        Error::new(ErrorKind::UserCanceled, "canceled")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::OutOfMemory => ErrorKind::ResourceExhausted,
            _ => ErrorKind::IoUnavailable,
        };
        Error { kind, context: err.to_string() }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error { kind: ErrorKind::FormatInvalid, context: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
