//! Error types for pulith-mirror.

use std::fmt;

use thiserror::Error;

/// Category of a single failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    Network,
    Http(u16),
    Timeout,
    Io,
    SizeLimit,
    Other,
}

impl TransferErrorKind {
    pub fn code(&self) -> u16 {
        match *self {
            TransferErrorKind::Network => 4,
            TransferErrorKind::Http(status) => status,
            TransferErrorKind::Timeout => 12,
            TransferErrorKind::Io => 16,
            TransferErrorKind::SizeLimit => 8,
            TransferErrorKind::Other => 1,
        }
    }
}

/// Error reported by a [`Fetcher`](crate::Fetcher) for one attempt against one mirror.
///
/// These never cross the public API on their own: the orchestrator records them in
/// the [`ErrorLog`] and only surfaces one inside [`Error::HardFail`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{}] {message}", .kind.code())]
pub struct TransferError {
    pub kind:    TransferErrorKind,
    pub message: String,
}

impl TransferError {
    pub fn new(kind: TransferErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self { Self::new(TransferErrorKind::Network, message) }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Http(status), message)
    }

    pub fn timeout(message: impl Into<String>) -> Self { Self::new(TransferErrorKind::Timeout, message) }

    pub fn io(message: impl Into<String>) -> Self { Self::new(TransferErrorKind::Io, message) }

    /// Stable numeric code; the HTTP status for HTTP failures.
    pub fn code(&self) -> u16 { self.kind.code() }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self { TransferError::io(e.to_string()) }
}

/// One failed attempt: the full URL that was tried and why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub url:     String,
    pub message: String,
}

/// Ordered record of every failed attempt made by one fetch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog(Vec<AttemptError>);

impl ErrorLog {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, url: impl Into<String>, message: impl Into<String>) {
        self.0.push(AttemptError {
            url:     url.into(),
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, AttemptError> { self.0.iter() }

    pub fn last(&self) -> Option<&AttemptError> { self.0.last() }

    pub fn urls(&self) -> Vec<&str> { self.0.iter().map(|e| e.url.as_str()).collect() }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", attempt.url, attempt.message)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ErrorLog {
    type Item = &'a AttemptError;
    type IntoIter = std::slice::Iter<'a, AttemptError>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no more mirrors to try ({} attempts): {errors}", .errors.len())]
    NoMoreMirrors { errors: ErrorLog },

    #[error("{source} (aborted after {} attempts: {errors})", .errors.len())]
    HardFail {
        #[source]
        source: TransferError,
        errors: ErrorLog,
    },

    #[error("invalid mirror configuration: {0}")]
    Config(String),

    #[error("deferred fetch did not complete: {0}")]
    Scheduler(String),
}

impl Error {
    /// Attempt log carried by a terminal fetch error.
    pub fn errors(&self) -> Option<&ErrorLog> {
        match self {
            Error::NoMoreMirrors { errors } | Error::HardFail { errors, .. } => Some(errors),
            Error::Config(_) | Error::Scheduler(_) => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self { Error::Config(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
