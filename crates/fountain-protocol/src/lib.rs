//! Binary frame codec and typed messages for the fountain wire protocol.
//!
//! The fountain exposes one GATT characteristic for writes and one for
//! notifications. Both carry the same frame layout:
//!
//! ```text
//! +----------+------+------+-----+-----+---+-------------+----+
//! | FA FC FD | code | kind | seq | len | 0 | payload[len] | FB |
//! +----------+------+------+-----+-----+---+-------------+----+
//! ```
//!
//! There is no checksum; a frame is only accepted when the magic header, the
//! start marker, the declared length and the end byte all line up. Multi-byte
//! integers inside payloads are big-endian.
//!
//! # Example
//!
//! ```rust
//! use fountain_protocol::{Command, Frame, Response};
//!
//! let bytes = Command::QueryBattery.to_frame(7).encode().unwrap();
//! let frame = Frame::decode(&bytes).unwrap();
//! assert_eq!(frame.seq, 7);
//!
//! let reply = Frame::reply(frame.code, 7, vec![0x0F, 0x3C, 80]);
//! let response = Response::from_frame(&reply).unwrap();
//! assert!(matches!(response, Response::Battery(_)));
//! ```

mod error;
mod framing;
mod types;

pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use framing::{Frame, FrameAssembler, FrameKind};
pub use types::{
    CommandCode, Command, Response, StatusReport, datetime_payload, device_id_bytes,
    device_secret, encode_config,
};

/// Magic bytes opening every frame.
pub const HEADER: [u8; 3] = [0xFA, 0xFC, 0xFD];

/// End byte closing every frame.
pub const TRAILER: u8 = 0xFB;

/// Value of the byte separating the header fields from the payload.
pub const START_MARKER: u8 = 0x00;

/// Size of a frame with an empty payload.
pub const MIN_FRAME_LEN: usize = 9;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
