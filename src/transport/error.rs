//! Transport error types

use thiserror::Error;

/// Failure to open or read a turn's event stream
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status(status), message)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Stream, message)
    }
}

/// Where in the stream lifecycle the failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request never produced a response
    Connect,
    /// The peer answered with a non-success HTTP status
    Status(u16),
    /// The body broke off or could not be parsed as an event stream
    Stream,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Status(_) => "status",
            Self::Stream => "stream",
        }
    }
}
