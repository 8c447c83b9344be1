/// Error types for the marketplace client
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BazaarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Not signed in: no access token stored")]
    Unauthenticated,

    #[error("Chat session is closed")]
    SessionClosed,
}

impl BazaarError {
    /// Short text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            BazaarError::Status { message, .. } if !message.is_empty() => message.clone(),
            BazaarError::Unauthenticated => "Please sign in again".to_string(),
            BazaarError::Validation(msg) => msg.clone(),
            BazaarError::Http(_) | BazaarError::Connection(_) | BazaarError::Timeout(_) => {
                "Network problem. Please try later".to_string()
            }
            _ => "Something went wrong. Please try later".to_string(),
        }
    }
}

impl From<sled::Error> for BazaarError {
    fn from(e: sled::Error) -> Self {
        BazaarError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BazaarError>;
