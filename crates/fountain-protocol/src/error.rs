//! Codec error types.

use thiserror::Error;

use crate::types::CommandCode;

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Errors raised while turning bytes into frames or typed responses.
///
/// A frame that fails to decode is dropped by the engine and never reaches
/// the device state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the smallest possible frame.
    #[error("frame too short: {len} bytes (min: {min})")]
    TooShort { len: usize, min: usize },

    /// The frame does not open with the magic header.
    #[error("bad frame header: {found:02X?}")]
    BadHeader { found: [u8; 3] },

    /// The byte before the payload is not the start marker.
    #[error("bad payload start marker: {found:#04x}")]
    BadStartMarker { found: u8 },

    /// The frame does not close with the end byte.
    #[error("bad frame trailer: {found:#04x}")]
    BadTrailer { found: u8 },

    /// The declared payload length does not match the bytes received.
    #[error("length mismatch: declared {declared} payload bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The command code is not one this codec knows.
    #[error("unknown command code: {0}")]
    UnknownCommand(u8),

    /// The payload is too short for the typed response.
    #[error("{code} payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        code: CommandCode,
        expected: usize,
        actual: usize,
    },

    /// A field holds a value outside its domain.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: u8 },
}

/// Errors raised while building frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Payload does not fit the one-byte length field.
    #[error("payload too long: {len} bytes (max: {max})")]
    PayloadTooLong { len: usize, max: usize },
}
