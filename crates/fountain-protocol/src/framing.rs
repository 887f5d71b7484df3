//! Frame layout and stream reassembly.
//!
//! ```text
//! offset  size  field
//! 0       3     magic FA FC FD
//! 3       1     command code
//! 4       1     frame kind
//! 5       1     sequence tag
//! 6       1     payload length N
//! 7       1     start marker (0)
//! 8       N     payload
//! 8+N     1     end byte FB
//! ```
//!
//! Notifications do not necessarily line up with frame boundaries, so inbound
//! bytes go through a [`FrameAssembler`] before decoding.

use std::fmt;

use tracing::trace;

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::types::CommandCode;
use crate::{HEADER, MAX_PAYLOAD_LEN, MIN_FRAME_LEN, START_MARKER, TRAILER};

/// Offset of the payload length byte.
const LEN_OFFSET: usize = 6;

/// Offset of the start marker, which is also the size of everything before
/// the payload minus one.
const MARKER_OFFSET: usize = 7;

/// Direction/purpose byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Sent by the host.
    Request,
    /// Sent by the device, either as a reply or as an unsolicited update.
    /// The full status query is also sent with this kind.
    Reply,
    /// Any other value, kept as received.
    Other(u8),
}

impl FrameKind {
    /// Returns the wire byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Request => 1,
            Self::Reply => 2,
            Self::Other(byte) => byte,
        }
    }
}

impl From<u8> for FrameKind {
    fn from(byte: u8) -> Self {
        match byte {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Reply => f.write_str("reply"),
            Self::Other(byte) => write!(f, "kind({byte})"),
        }
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: CommandCode,
    pub kind: FrameKind,
    /// Correlation tag. Replies echo the tag of the request.
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame.
    pub fn new(code: CommandCode, kind: FrameKind, seq: u8, payload: Vec<u8>) -> Self {
        Self {
            code,
            kind,
            seq,
            payload,
        }
    }

    /// Creates a host-to-device frame.
    pub fn request(code: CommandCode, seq: u8, payload: Vec<u8>) -> Self {
        Self::new(code, FrameKind::Request, seq, payload)
    }

    /// Creates a device-to-host frame.
    pub fn reply(code: CommandCode, seq: u8, payload: Vec<u8>) -> Self {
        Self::new(code, FrameKind::Reply, seq, payload)
    }

    /// Serializes the frame.
    pub fn encode(&self) -> EncodeResult<Vec<u8>> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD_LEN {
            return Err(EncodeError::PayloadTooLong {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut buffer = Vec::with_capacity(MIN_FRAME_LEN + len);
        buffer.extend_from_slice(&HEADER);
        buffer.push(self.code.as_u8());
        buffer.push(self.kind.as_byte());
        buffer.push(self.seq);
        buffer.push(len as u8);
        buffer.push(START_MARKER);
        buffer.extend_from_slice(&self.payload);
        buffer.push(TRAILER);
        Ok(buffer)
    }

    /// Parses exactly one frame. Trailing or missing bytes are an error.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        if data.len() < MIN_FRAME_LEN {
            return Err(DecodeError::TooShort {
                len: data.len(),
                min: MIN_FRAME_LEN,
            });
        }

        if data[..HEADER.len()] != HEADER {
            return Err(DecodeError::BadHeader {
                found: [data[0], data[1], data[2]],
            });
        }

        let declared = usize::from(data[LEN_OFFSET]);
        let actual = data.len() - MIN_FRAME_LEN;
        if declared != actual {
            return Err(DecodeError::LengthMismatch { declared, actual });
        }

        if data[MARKER_OFFSET] != START_MARKER {
            return Err(DecodeError::BadStartMarker {
                found: data[MARKER_OFFSET],
            });
        }

        let last = data[data.len() - 1];
        if last != TRAILER {
            return Err(DecodeError::BadTrailer { found: last });
        }

        let code = CommandCode::try_from(data[3])?;
        Ok(Self {
            code,
            kind: FrameKind::from(data[4]),
            seq: data[5],
            payload: data[MARKER_OFFSET + 1..data.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} seq={} payload=[", self.code, self.kind, self.seq)?;
        for (i, byte) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        f.write_str("]")
    }
}

/// Reassembles frames from a stream of notification payloads.
///
/// Bytes preceding a magic header are discarded. When a candidate frame
/// fails to decode, only its first byte is consumed so the next header in
/// the buffer can be picked up.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Extracts the next complete frame.
    ///
    /// Returns `None` when more bytes are needed, and `Some(Err(_))` for a
    /// candidate that turned out to be corrupt.
    pub fn next_frame(&mut self) -> Option<DecodeResult<Frame>> {
        match self
            .buffer
            .windows(HEADER.len())
            .position(|window| window == HEADER)
        {
            Some(0) => {}
            Some(start) => {
                trace!(skipped = start, "Discarding bytes before frame header");
                self.buffer.drain(..start);
            }
            None => {
                let keep = partial_header_len(&self.buffer);
                let skipped = self.buffer.len() - keep;
                if skipped > 0 {
                    trace!(skipped, "Discarding bytes without frame header");
                    self.buffer.drain(..skipped);
                }
                return None;
            }
        }

        if self.buffer.len() <= LEN_OFFSET {
            return None;
        }
        let total = MIN_FRAME_LEN + usize::from(self.buffer[LEN_OFFSET]);
        if self.buffer.len() < total {
            let err = self.incomplete_candidate_error(total)?;
            self.buffer.drain(..1);
            return Some(Err(err));
        }

        match Frame::decode(&self.buffer[..total]) {
            Ok(frame) => {
                self.buffer.drain(..total);
                Some(Ok(frame))
            }
            Err(err) => {
                // Framing was intact, only the code is unknown.
                let consumed = if matches!(err, DecodeError::UnknownCommand(_)) {
                    total
                } else {
                    1
                };
                self.buffer.drain(..consumed);
                Some(Err(err))
            }
        }
    }
}

impl FrameAssembler {
    /// Decides whether an incomplete candidate at the front of the buffer is
    /// already known to be corrupt, so a bad length byte cannot hold back
    /// the frames behind it.
    fn incomplete_candidate_error(&self, total: usize) -> Option<DecodeError> {
        if let Some(&found) = self.buffer.get(MARKER_OFFSET)
            && found != START_MARKER
        {
            return Some(DecodeError::BadStartMarker { found });
        }

        // A whole valid frame inside the declared span means the length
        // byte is wrong.
        let next = (1..self.buffer.len()).find(|&start| {
            let rest = &self.buffer[start..];
            if !rest.starts_with(&HEADER) || rest.len() <= LEN_OFFSET {
                return false;
            }
            let len = MIN_FRAME_LEN + usize::from(rest[LEN_OFFSET]);
            rest.len() >= len && Frame::decode(&rest[..len]).is_ok()
        })?;
        Some(DecodeError::LengthMismatch {
            declared: total - MIN_FRAME_LEN,
            actual: next.saturating_sub(MIN_FRAME_LEN),
        })
    }
}

/// Length of the longest header prefix the buffer ends with.
fn partial_header_len(buffer: &[u8]) -> usize {
    (1..HEADER.len())
        .rev()
        .find(|&len| buffer.ends_with(&HEADER[..len]))
        .unwrap_or(0)
}
