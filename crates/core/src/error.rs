//! Unified error types for the sync engine.
//!
//! Fetch failures carry the HTTP status that produced them so the task
//! processor can tell transient failures from permanent ones:
//! - 0: transport failure (connection, timeout, cancelled limiter wait)
//! - 408/425/429/500/502/503/504: retryable
//! - anything else: permanent

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Statuses worth retrying inside a task.
pub const RETRYABLE_STATUSES: [u16; 8] = [0, 408, 425, 429, 500, 502, 503, 504];

/// Maximum body length quoted in fetch error messages.
pub const ERROR_BODY_LIMIT: usize = 500;

/// Unified error type for the sync engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote API answered with status >= 400.
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    /// Request never produced a status (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Response arrived but could not be decoded.
    #[error("decode error (status {status}): {message}")]
    Decode { status: u16, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an HTTP error, truncating the quoted body.
    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        Self::Http {
            status,
            body: truncate(body.as_ref(), ERROR_BODY_LIMIT),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(status: u16, msg: impl Into<String>) -> Self {
        Self::Decode {
            status,
            message: msg.into(),
        }
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status associated with this error, 0 when none was received.
    pub fn status(&self) -> u16 {
        match self {
            Self::Http { status, .. } => *status,
            Self::Decode { status, .. } => *status,
            _ => 0,
        }
    }

    /// Whether a fetch failing with this error should be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => is_retryable_status(*status),
            Self::Network(_) => true,
            _ => false,
        }
    }
}

/// Whether a status belongs to the retryable set.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Cut a string to at most `max` characters, marking the cut.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
