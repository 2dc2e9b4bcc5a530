//! Packet framing.
//!
//! The wire is a sequence of independent packets, each opened by a
//! fixed 10-byte header. All multi-byte integers are big-endian.
//!
//! Header layout, bit lengths in parentheses; reserved fields must be
//! zero:
//!
//! `| Version(8) | RSV1(16) | Packet Type(8) | RSV2(16) | Packet Length(16) | Packet ID(16) |`

use std::fmt;
use std::io;

/// The only protocol version this codec speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Byte length of the packet header.
pub const HEADER_LEN: usize = 10;

/// Byte length of the entity header that opens every typed payload.
pub const ENTITY_LEN: usize = 24;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All wire decode failures.
///
/// Everything except `Eof` is fatal for the stream: once bytes of a
/// packet have been consumed the decoder is desynced and the transport
/// is dropped.
#[derive(Debug)]
pub enum WireError {
    /// Clean end of stream at a packet boundary.
    Eof,
    /// The transport ended mid-packet.
    Truncated,
    /// Reserved bits nonzero, bad packet type, or counts out of range.
    Malformed(&'static str),
    /// Version byte other than `PROTOCOL_VERSION`.
    UnsupportedVersion(u8),
    /// Transport-level read failure.
    Io(io::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Eof => write!(f, "end of stream"),
            WireError::Truncated => write!(f, "transport ended mid-packet"),
            WireError::Malformed(msg) => write!(f, "malformed packet: {}", msg),
            WireError::UnsupportedVersion(v) => {
                write!(f, "unsupported protocol version {} (want {})", v, PROTOCOL_VERSION)
            }
            WireError::Io(err) => write!(f, "transport error: {}", err),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else {
            WireError::Io(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Packet types
// ---------------------------------------------------------------------------

/// Typed packets of the protocol. Type 0 is reserved and forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SetConfig = 1,
    DoProcess = 2,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Result<PacketType, WireError> {
        match b {
            0 => Err(WireError::Malformed("forbidden zero packet type")),
            1 => Ok(PacketType::SetConfig),
            2 => Ok(PacketType::DoProcess),
            _ => Err(WireError::Malformed("unknown packet type")),
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Frame header
// ---------------------------------------------------------------------------

/// Decoded packet header.
///
/// `payload_len` is the advisory byte length of the payload following
/// the header; `packet_id` is a host-policy correlation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub packet_type: PacketType,
    pub payload_len: u16,
    pub packet_id: u16,
}

impl FrameHeader {
    /// Decode a header from its 10 wire bytes.
    pub fn decode(b: &[u8; HEADER_LEN]) -> Result<FrameHeader, WireError> {
        if b[0] != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(b[0]));
        }
        let rsv1 = u16::from_be_bytes([b[1], b[2]]);
        let rsv2 = u16::from_be_bytes([b[4], b[5]]);
        if rsv1 != 0 || rsv2 != 0 {
            return Err(WireError::Malformed("reserved header bytes are not zero"));
        }
        Ok(FrameHeader {
            version: b[0],
            packet_type: PacketType::from_byte(b[3])?,
            payload_len: u16::from_be_bytes([b[6], b[7]]),
            packet_id: u16::from_be_bytes([b[8], b[9]]),
        })
    }

    /// Encode this header into its 10 wire bytes.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let len = self.payload_len.to_be_bytes();
        let id = self.packet_id.to_be_bytes();
        [
            self.version,
            0,
            0,
            self.packet_type.to_byte(),
            0,
            0,
            len[0],
            len[1],
            id[0],
            id[1],
        ]
    }
}
