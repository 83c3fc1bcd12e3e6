//! Error types for askmynotes-core

use thiserror::Error;

/// Main error type for the askmynotes-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the backend
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Backend body could not be decoded
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// File rejected before it reached the store
    #[error("unsupported file {0}: only .pdf and .txt are accepted")]
    UnsupportedFile(String),
}

impl Error {
    /// Whether the failure looks transient (network trouble or a 5xx).
    ///
    /// Nothing in the store retries on its own; this is exposed on
    /// reconciliation events so a caller can decide.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::InvalidResponse(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

/// Result type alias for askmynotes-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient() {
        assert!(Error::Http("connection refused".to_string()).is_transient());
        assert!(Error::Api {
            status: 502,
            body: "bad gateway".to_string()
        }
        .is_transient());
        assert!(!Error::Api {
            status: 422,
            body: "missing field".to_string()
        }
        .is_transient());
        assert!(!Error::Config("bad".to_string()).is_transient());
        assert!(!Error::InvalidResponse("bad utf-8".to_string()).is_transient());
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "API error (500): boom");
    }
}
