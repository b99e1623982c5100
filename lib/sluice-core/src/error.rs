//! Error types for sluice.
//!
//! Every failure surfaced by a pipeline run is an [`Error`]: a typed
//! [`ErrorKind`] plus the last [`RequestContext`] and, when one exists, the
//! last [`ResponseContext`], so callers and error steps can inspect what
//! happened.

use std::fmt;

use derive_more::{Display, Error, From};

use crate::{RequestContext, ResponseContext};

// ============================================================================
// Transport Error
// ============================================================================

/// Failure reported by an [`Adapter`](crate::Adapter).
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransportError {
    /// Network/connection errors (refused, reset, DNS).
    #[display("connection error: {_0}")]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    Tls(#[error(not(source))] String),

    /// The adapter gave up waiting.
    #[display("request timeout")]
    Timeout,

    /// The peer answered with something that is not valid HTTP.
    #[display("protocol error: {_0}")]
    Protocol(#[error(not(source))] String),
}

impl TransportError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

// ============================================================================
// Error Kind
// ============================================================================

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, From)]
pub enum ErrorKind {
    /// The adapter could not complete the exchange.
    #[display("{_0}")]
    #[from]
    Transport(TransportError),

    /// A status the caller asked to treat as an error.
    #[display("HTTP error {status}")]
    #[from(skip)]
    HttpStatus {
        /// HTTP status code.
        status: u16,
    },

    /// The body does not match its declared encoding or content type.
    #[display("decode error: {message}")]
    #[from(skip)]
    Decode {
        /// Decoder message.
        message: String,
    },

    /// Malformed options (auth, netrc, range, URL, ...).
    #[display("invalid configuration: {_0}")]
    #[from(skip)]
    Config(#[error(not(source))] String),

    /// The redirect limit was exceeded.
    #[display("too many redirects (max {max})")]
    #[from(skip)]
    TooManyRedirects {
        /// Maximum allowed redirects.
        max: usize,
    },

    /// Every retry failed.
    #[display("retries exhausted after {attempts} attempts: {source}")]
    #[from(skip)]
    RetriesExhausted {
        /// Total number of attempts, the first one included.
        attempts: u32,
        /// Failure of the last attempt.
        source: Box<ErrorKind>,
    },
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for sluice operations.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    request: Option<Box<RequestContext>>,
    response: Option<Box<ResponseContext>>,
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error of the given kind, without context.
    #[must_use]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            request: None,
            response: None,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config(message.into()))
    }

    /// Create a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode {
            message: message.into(),
        })
    }

    /// Create an HTTP status error.
    #[must_use]
    pub fn http_status(status: u16) -> Self {
        Self::new(ErrorKind::HttpStatus { status })
    }

    /// Attach the request that was in flight.
    #[must_use]
    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(Box::new(request));
        self
    }

    /// Attach the last response received.
    #[must_use]
    pub fn with_response(mut self, response: ResponseContext) -> Self {
        self.response = Some(Box::new(response));
        self
    }

    /// What went wrong.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Consume into the kind.
    #[must_use]
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// The last request, once the runner attached it.
    #[must_use]
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }

    /// The last response, if one was received.
    #[must_use]
    pub fn response(&self) -> Option<&ResponseContext> {
        self.response.as_deref()
    }

    pub(crate) fn has_request(&self) -> bool {
        self.request.is_some()
    }

    /// Returns `true` if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport(_))
    }

    /// Returns `true` if this is a transport timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport(TransportError::Timeout))
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self.kind, ErrorKind::Config(_))
    }

    /// Returns the HTTP status code of the last response, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::HttpStatus { status } => Some(*status),
            _ => self.response.as_ref().map(|response| response.status()),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("request", &self.request.as_ref().map(|r| r.url().to_string()))
            .field("status", &self.response.as_ref().map(|r| r.status()))
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Self::new(ErrorKind::Transport(error))
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Self::config(format!("invalid URL: {error}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::config(format!("JSON serialization error: {error}"))
    }
}

impl From<serde_html_form::ser::Error> for Error {
    fn from(error: serde_html_form::ser::Error) -> Self {
        Self::config(format!("form serialization error: {error}"))
    }
}
