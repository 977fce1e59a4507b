//! Transport layer error types.
//!
//! Malformed packets are local to the receiving side: the packet is logged
//! and dropped and the connection carries on.

use std::io;

use thiserror::Error;

use crate::core::{DecodeError, ValueError};

/// Errors raised while framing or parsing a packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Packet is too short.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Packet type byte is not a known packet type.
    #[error("invalid packet type: 0x{0:02x}")]
    InvalidType(u8),

    /// Known packet type arriving on the wrong transport.
    #[error("unexpected packet type 0x{0:02x} for this transport")]
    UnexpectedType(u8),

    /// Record type byte is not live or sample.
    #[error("invalid record type: 0x{0:02x}")]
    InvalidRecordType(u8),

    /// A record boundary was found past the record's computed size.
    #[error("misplaced end of record marker at offset {offset}")]
    MisplacedSeparator {
        /// Offset of the separator within the record data.
        offset: usize,
    },

    /// Record set is not terminated with the end-of-transmission byte.
    #[error("missing end of transmission marker")]
    MissingEndOfTransmission,

    /// Data ran out before the last record was complete.
    #[error("record incomplete: no more data in packet")]
    IncompleteRecord,

    /// Record for a station id not in the station list.
    #[error("unknown station id {0}")]
    UnknownStation(u8),

    /// Length field disagrees with the data.
    #[error("length mismatch: header says {expected}, but {actual} bytes available")]
    LengthMismatch {
        /// Length from the header.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Packet would exceed its maximum size.
    #[error("packet is over-full: {size} bytes exceeds maximum of {max}")]
    TooLarge {
        /// Encoded size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Text section is not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidText(&'static str),

    /// Record field data could not be decoded.
    #[error("field data: {0}")]
    Decode(#[from] DecodeError),

    /// Header value out of range.
    #[error("value: {0}")]
    Value(#[from] ValueError),
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Packet framing error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Server rejected the authorisation code.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// No station list arrived before the handshake timed out.
    #[error("handshake timeout")]
    HandshakeTimeout,

    /// Peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}

impl TransportError {
    /// Whether the offending packet should just be dropped and the
    /// connection kept open.
    pub fn is_silent_drop(&self) -> bool {
        matches!(self, TransportError::Packet(_))
    }

    /// Whether this error ends the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::AuthenticationFailed
                | TransportError::ConnectionClosed
                | TransportError::Io(_)
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
