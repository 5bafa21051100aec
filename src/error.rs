//! Error types for the state store and sync client.

use thiserror::Error;

/// Main error type for state operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State directory is locked by another process")]
    Locked,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StateError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => StateError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => StateError::Transport(e.to_string()),
        }
    }
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
