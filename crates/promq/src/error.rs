//! Error types for promq.
//!
//! Errors are split by concern: [`ConfigError`] for startup inputs,
//! [`TransportError`] for the HTTP round trip, [`QueryError`] for the query
//! protocol and [`Error`] at the process boundary. None of them ever carries
//! the bearer credential or the backend address in its message.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for process-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading the immutable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path of the missing file.
        path: PathBuf,
    },

    /// A configuration file exists but could not be read.
    #[error("configuration file unreadable: {path}: {source}")]
    Unreadable {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A configuration value is empty after trimming.
    #[error("configuration value is empty: {what}")]
    Empty {
        /// Which value was empty.
        what: &'static str,
    },

    /// The backend address is not a usable base URL.
    #[error("invalid backend address: {reason}")]
    InvalidAddress {
        /// Why the address was rejected.
        reason: String,
    },

    /// The bearer credential cannot be carried in an HTTP header.
    #[error("invalid credential: {reason}")]
    InvalidCredential {
        /// Why the credential was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an `InvalidAddress` error with a reason.
    #[must_use]
    pub fn invalid_address(reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidCredential` error with a reason.
    #[must_use]
    pub fn invalid_credential(reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            reason: reason.into(),
        }
    }

    /// Maps a failed file read to `NotFound` or `Unreadable`.
    #[must_use]
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Unreadable { path, source }
        }
    }
}

/// Errors raised by the underlying HTTP transport.
///
/// Messages are built from the error chain with the request URL removed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established (DNS, refused, TLS handshake).
    #[error("connection failed: {message}")]
    Connect {
        /// Description of the failure.
        message: String,
    },

    /// The transport's own connect timeout elapsed.
    #[error("connection timed out")]
    Timeout,

    /// The request failed after the connection was established.
    #[error("request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
    },

    /// The response body could not be read.
    #[error("failed to read response body: {message}")]
    Body {
        /// Description of the failure.
        message: String,
    },

    /// The request could not be handed to the HTTP client.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the failure.
        message: String,
    },
}

impl TransportError {
    /// Classifies a `reqwest` error, stripping the URL first.
    #[must_use]
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            return Self::Timeout;
        }
        let message = error_chain(&err);
        if err.is_connect() {
            Self::Connect { message }
        } else if err.is_body() || err.is_decode() {
            Self::Body { message }
        } else if err.is_builder() {
            Self::InvalidRequest { message }
        } else {
            Self::Request { message }
        }
    }
}

/// Joins an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Errors raised while executing an instant query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query expression was empty.
    #[error("query expression is empty")]
    EmptyQuery,

    /// The transport failed before a response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The client-side deadline elapsed before a response arrived.
    #[error("deadline exceeded: no response within {timeout:?}")]
    DeadlineExceeded {
        /// The deadline that was configured for the call.
        timeout: Duration,
    },

    /// The call was canceled through its cancellation token.
    #[error("query canceled")]
    Canceled,

    /// The backend answered with an error payload.
    #[error("server rejected query ({error_type}): {message}")]
    ServerRejected {
        /// Backend error type (e.g. `bad_data`, `server_error`).
        error_type: String,
        /// Backend error message, verbatim.
        message: String,
    },

    /// The backend answered with something that is not a valid envelope.
    #[error("bad response: {message}")]
    BadResponse {
        /// Description of the problem.
        message: String,
    },
}

impl QueryError {
    /// Creates a `ServerRejected` error.
    #[must_use]
    pub fn server_rejected(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServerRejected {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Creates a `BadResponse` error.
    #[must_use]
    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::BadResponse {
            message: message.into(),
        }
    }

    /// Returns `true` if the call ended because it was canceled or timed out
    /// on the client side.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. } | Self::Canceled)
    }

    /// Returns `true` if the backend could not be reached.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the backend returned an error payload.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ServerRejected { .. })
    }
}

/// Process-level errors. Every variant ends the process with a nonzero exit.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The query failed.
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    /// The backend returned a value together with warnings.
    #[error("warnings: [{}]", .warnings.join(", "))]
    WarningsPresent {
        /// Warnings returned by the backend.
        warnings: Vec<String>,
    },

    /// Writing the report failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
