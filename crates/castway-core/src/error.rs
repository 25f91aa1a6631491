//! Error types for Castway Core

use thiserror::Error;

/// Result type alias for castway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Castway error types
#[derive(Error, Debug)]
pub enum Error {
    // Playlist errors
    #[error("Playlist fetch failed with HTTP {status}")]
    Fetch { status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Proxy errors
    #[error("Proxy template must contain the {{url}} placeholder: {0}")]
    InvalidProxyTemplate(String),

    // Request pipeline errors
    #[error("Header rejected by transport: {name}")]
    HeaderRejected { name: String },

    // Engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("No active playback session")]
    NoActiveSession,

    // Settings errors
    #[error("Settings store error: {0}")]
    Settings(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Error::Settings(msg.into())
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Fetch { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns a stable error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Fetch { .. } => "FETCH",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::InvalidProxyTemplate(_) => "INVALID_PROXY_TEMPLATE",
            Error::HeaderRejected { .. } => "HEADER_REJECTED",
            Error::Engine(_) => "ENGINE",
            Error::NoActiveSession => "NO_SESSION",
            Error::Settings(_) => "SETTINGS",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Network(_) => "NETWORK",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = Error::Fetch { status: 404 };
        assert_eq!(err.to_string(), "Playlist fetch failed with HTTP 404");
        assert_eq!(err.error_code(), "FETCH");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_server_errors_are_recoverable() {
        assert!(Error::Fetch { status: 503 }.is_recoverable());
        assert!(Error::Fetch { status: 429 }.is_recoverable());
        assert!(!Error::NoActiveSession.is_recoverable());
    }
}
