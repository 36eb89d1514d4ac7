//! Error types for the Mimecast client

use crate::client::SessionState;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MimecastError>;

/// Errors raised while computing a request signature
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The secret key handed out at login is not valid base64
    #[error("secret key is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The decoded key was rejected by the HMAC implementation
    #[error("secret key has an invalid length for HMAC-SHA1")]
    KeyLength,
}

/// Everything that can go wrong talking to the Mimecast API
#[derive(Debug, thiserror::Error)]
pub enum MimecastError {
    /// Region discovery returned a non-200 status; no API host is known
    #[error("region discovery failed with status {status}")]
    Discovery { status: u16 },

    /// Login returned a non-200 status; the session has no keys
    #[error("login failed with status {status}")]
    Auth { status: u16 },

    /// A signed call returned a non-200 status
    #[error("request to {path} failed with status {status}")]
    Request { path: String, status: u16 },

    /// The server answered 200 but reported failures in the `fail` array
    #[error("request to {path} was rejected: {}", errors.join("; "))]
    Api { path: String, errors: Vec<String> },

    #[error("malformed response from {path}: {reason}")]
    MalformedResponse { path: String, reason: String },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// An operation was attempted in the wrong session state
    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// The feed has nothing pending and will not wait for more
    #[error("hold feed exhausted")]
    StreamExhausted,

    #[error("invalid feed options: {0}")]
    InvalidFeedOptions(String),

    #[error("failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] ureq::Error),
}

impl MimecastError {
    /// HTTP status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Discovery { status } | Self::Auth { status } | Self::Request { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
