//! Engine error types.

use std::time::Duration;

use fountain_protocol::{CommandCode, DecodeError};
use thiserror::Error;

use crate::connection::ConnectionState;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for device commands.
pub type CommandResult<T> = Result<T, CommandError>;

/// Result type for engine setup.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by the host transport.
///
/// None of these are fatal: the connection manager reacts to all of them by
/// reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The link could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The link was not established in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Notifications could not be enabled.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// A frame could not be written.
    #[error("write failed: {0}")]
    Write(String),

    /// The link did not close cleanly.
    #[error("disconnect failed: {0}")]
    Disconnect(String),
}

impl TransportError {
    /// Creates a connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    /// Creates a subscribe error.
    pub fn subscribe(message: impl Into<String>) -> Self {
        Self::Subscribe(message.into())
    }

    /// Creates a write error.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    /// Creates a disconnect error.
    pub fn disconnect(message: impl Into<String>) -> Self {
        Self::Disconnect(message.into())
    }
}

/// Failures surfaced to command callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No matching reply arrived in time. The request was withdrawn and is
    /// not retried.
    #[error("{command} timed out after {timeout:?}")]
    Timeout {
        command: CommandCode,
        timeout: Duration,
    },

    /// The link went away while the request was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// The reply could not be understood or reported a failure.
    #[error("protocol error on {command}: {reason}")]
    Protocol {
        command: CommandCode,
        reason: String,
    },

    /// Commands are only accepted while the device is ready.
    #[error("not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    /// An argument is outside the range the device accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A settings change needs the current settings, which have not been
    /// read yet.
    #[error("device settings are not known yet")]
    ConfigUnavailable,

    /// Every sequence tag is in use by an outstanding request.
    #[error("too many outstanding requests")]
    TagsExhausted,

    /// The engine is shutting down.
    #[error("engine is shutting down")]
    Shutdown,
}

impl CommandError {
    /// Creates a protocol error.
    pub fn protocol(command: CommandCode, reason: impl Into<String>) -> Self {
        Self::Protocol {
            command,
            reason: reason.into(),
        }
    }

    /// Creates a protocol error from a payload that failed to decode.
    pub fn decode(command: CommandCode, err: &DecodeError) -> Self {
        Self::protocol(command, err.to_string())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Failures building the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl EngineError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
