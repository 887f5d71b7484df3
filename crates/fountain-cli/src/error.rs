//! Client error types.

use fountain_protocol::{DecodeError, EncodeError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input bytes did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A frame could not be built.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Bad command-line input.
    #[error("{0}")]
    Usage(String),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

impl From<fountain_engine::EngineError> for ClientError {
    fn from(err: fountain_engine::EngineError) -> Self {
        match err {
            fountain_engine::EngineError::Config { message } => Self::Config(message),
        }
    }
}
