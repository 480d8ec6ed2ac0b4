//! Error types for the bar stream

use thiserror::Error;

/// Errors raised by a [`BarStream`](crate::stream::BarStream) while connecting or streaming
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Invalid symbol list: {0}")]
    InvalidSymbols(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Stream dropped its termination signal without reporting a cause")]
    SignalDropped,
}

/// Fatal outcomes of a [`LifecycleController`](crate::lifecycle::LifecycleController) run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Failed to establish bar stream: {0}")]
    Connect(StreamError),

    #[error("Bar stream terminated: {0}")]
    StreamTerminated(StreamError),
}

impl LifecycleError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            LifecycleError::Connect(_) | LifecycleError::StreamTerminated(_) => 1,
        }
    }

    /// The underlying stream error
    pub fn cause(&self) -> &StreamError {
        match self {
            LifecycleError::Connect(e) | LifecycleError::StreamTerminated(e) => e,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Io(e) => StreamError::Connection(e.to_string()),
            WsError::Url(e) => StreamError::InvalidConfig(e.to_string()),
            WsError::Http(response) => {
                StreamError::Connection(format!("HTTP {} during upgrade", response.status()))
            }
            other => StreamError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Protocol(err.to_string())
    }
}
