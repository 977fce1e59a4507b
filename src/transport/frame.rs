//! Packet headers for the weather-push transports.
//!
//! All multi-byte integers on the wire are big-endian.

use crate::core::{
    PACKET_TYPE_AUTHENTICATE, PACKET_TYPE_AUTHENTICATE_FAILED, PACKET_TYPE_IMAGE,
    PACKET_TYPE_IMAGE_ACK, PACKET_TYPE_SAMPLE_ACK_TCP, PACKET_TYPE_SAMPLE_ACK_UDP,
    PACKET_TYPE_STATION_INFO_REQUEST, PACKET_TYPE_STATION_INFO_RESPONSE,
    PACKET_TYPE_STATION_INFO_TCP, PACKET_TYPE_WEATHER_DATA_TCP, PACKET_TYPE_WEATHER_DATA_UDP,
};

use super::error::PacketError;

/// Wire sizes of headers and fixed-width records.
pub mod sizes {
    /// Common packet header (type + reserved).
    pub const PACKET_HEADER_SIZE: usize = 2;
    /// UDP packet header (type + reserved + sequence + auth code).
    pub const UDP_HEADER_SIZE: usize = PACKET_HEADER_SIZE + 2 + 8;
    /// TCP weather data length field.
    pub const TCP_LENGTH_SIZE: usize = 2;
    /// TCP authenticate packet, always exactly this long.
    pub const AUTHENTICATE_PACKET_SIZE: usize = PACKET_HEADER_SIZE + 8;
    /// Live record header (type + station id + sequence + field mask).
    pub const LIVE_RECORD_HEADER_SIZE: usize = 1 + 1 + 2 + 4;
    /// Sample record header (type + station id + two timestamps + field mask).
    pub const SAMPLE_RECORD_HEADER_SIZE: usize = 1 + 1 + 4 + 4 + 4;
    /// Station info record (code + hardware type id + station id).
    pub const STATION_INFO_RECORD_SIZE: usize = 5 + 1 + 1;
    /// Image type or source code map entry (code + id).
    pub const CODE_MAP_RECORD_SIZE: usize = 5 + 1;
    /// Sample acknowledgement record (timestamp + station id).
    pub const SAMPLE_ACK_RECORD_SIZE: usize = 4 + 1;
    /// Image acknowledgement record (timestamp + source id + type id).
    pub const IMAGE_ACK_RECORD_SIZE: usize = 4 + 1 + 1;
    /// Image payload header (total length + type + source + timestamp + text length).
    pub const IMAGE_PAYLOAD_HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 4;
}

/// Packet type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// UDP: ask for the station list.
    StationInfoRequest = PACKET_TYPE_STATION_INFO_REQUEST,
    /// UDP: station list.
    StationInfoResponse = PACKET_TYPE_STATION_INFO_RESPONSE,
    /// UDP: weather records.
    WeatherDataUdp = PACKET_TYPE_WEATHER_DATA_UDP,
    /// UDP: sample acknowledgements.
    SampleAcknowledgementUdp = PACKET_TYPE_SAMPLE_ACK_UDP,
    /// TCP: authorisation code.
    Authenticate = PACKET_TYPE_AUTHENTICATE,
    /// TCP: station list and image code maps.
    StationInfo = PACKET_TYPE_STATION_INFO_TCP,
    /// TCP: weather records.
    WeatherDataTcp = PACKET_TYPE_WEATHER_DATA_TCP,
    /// TCP: sample acknowledgements.
    SampleAcknowledgementTcp = PACKET_TYPE_SAMPLE_ACK_TCP,
    /// TCP: authorisation code rejected.
    AuthenticateFailed = PACKET_TYPE_AUTHENTICATE_FAILED,
    /// TCP: image upload.
    Image = PACKET_TYPE_IMAGE,
    /// TCP: image acknowledgements.
    ImageAcknowledgement = PACKET_TYPE_IMAGE_ACK,
}

impl PacketType {
    /// Parse packet type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            PACKET_TYPE_STATION_INFO_REQUEST => Some(Self::StationInfoRequest),
            PACKET_TYPE_STATION_INFO_RESPONSE => Some(Self::StationInfoResponse),
            PACKET_TYPE_WEATHER_DATA_UDP => Some(Self::WeatherDataUdp),
            PACKET_TYPE_SAMPLE_ACK_UDP => Some(Self::SampleAcknowledgementUdp),
            PACKET_TYPE_AUTHENTICATE => Some(Self::Authenticate),
            PACKET_TYPE_STATION_INFO_TCP => Some(Self::StationInfo),
            PACKET_TYPE_WEATHER_DATA_TCP => Some(Self::WeatherDataTcp),
            PACKET_TYPE_SAMPLE_ACK_TCP => Some(Self::SampleAcknowledgementTcp),
            PACKET_TYPE_AUTHENTICATE_FAILED => Some(Self::AuthenticateFailed),
            PACKET_TYPE_IMAGE => Some(Self::Image),
            PACKET_TYPE_IMAGE_ACK => Some(Self::ImageAcknowledgement),
            _ => None,
        }
    }

    /// Convert packet type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the packet type belongs to the TCP transport.
    pub fn is_tcp(self) -> bool {
        !self.is_udp()
    }

    /// Whether the packet type belongs to the UDP transport.
    pub fn is_udp(self) -> bool {
        matches!(
            self,
            Self::StationInfoRequest
                | Self::StationInfoResponse
                | Self::WeatherDataUdp
                | Self::SampleAcknowledgementUdp
        )
    }
}

/// Read the packet type from the first byte of `data`.
pub fn peek_packet_type(data: &[u8]) -> Result<PacketType, PacketError> {
    let byte = *data.first().ok_or(PacketError::TooShort {
        expected: 1,
        actual: 0,
    })?;
    PacketType::from_byte(byte).ok_or(PacketError::InvalidType(byte))
}

/// UDP packet header.
///
/// Wire format (12 bytes):
/// ```text
/// +--------+----------+------------+--------------------+
/// | Type   | Reserved | Sequence   | Authorisation code |
/// | 1 byte | 1 byte   | 2 bytes    | 8 bytes            |
/// +--------+----------+------------+--------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Packet type.
    pub packet_type: PacketType,
    /// Per-connection packet sequence number.
    pub sequence: u16,
    /// Client authorisation code.
    pub authorisation_code: u64,
}

impl UdpHeader {
    /// Create a new UDP header.
    pub fn new(packet_type: PacketType, sequence: u16, authorisation_code: u64) -> Self {
        Self {
            packet_type,
            sequence,
            authorisation_code,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; sizes::UDP_HEADER_SIZE] {
        let mut buf = [0u8; sizes::UDP_HEADER_SIZE];
        buf[0] = self.packet_type.as_byte();
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..12].copy_from_slice(&self.authorisation_code.to_be_bytes());
        buf
    }

    /// Parse header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        ensure_len(bytes, sizes::UDP_HEADER_SIZE)?;
        let packet_type = PacketType::from_byte(bytes[0]).ok_or(PacketError::InvalidType(bytes[0]))?;
        let sequence = read_u16(&bytes[2..4]);
        let authorisation_code = u64::from_be_bytes([
            bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11],
        ]);

        Ok(Self {
            packet_type,
            sequence,
            authorisation_code,
        })
    }
}

/// TCP packet header: just the type and a reserved byte.
pub fn tcp_header(packet_type: PacketType) -> [u8; sizes::PACKET_HEADER_SIZE] {
    [packet_type.as_byte(), 0]
}

pub(crate) fn ensure_len(data: &[u8], expected: usize) -> Result<(), PacketError> {
    if data.len() < expected {
        return Err(PacketError::TooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

pub(crate) fn read_u16(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

pub(crate) fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(packet_type) = PacketType::from_byte(byte) {
                assert_eq!(packet_type.as_byte(), byte);
            }
        }
        assert_eq!(PacketType::from_byte(0x0A), None);
        assert_eq!(PacketType::from_byte(0x10), Some(PacketType::Image));
    }

    #[test]
    fn test_transport_classification() {
        assert!(PacketType::WeatherDataUdp.is_udp());
        assert!(PacketType::WeatherDataTcp.is_tcp());
        assert!(PacketType::ImageAcknowledgement.is_tcp());
        assert!(!PacketType::StationInfoRequest.is_tcp());
    }

    #[test]
    fn test_udp_header_layout() {
        let header = UdpHeader::new(PacketType::WeatherDataUdp, 0x0102, 0x1122_3344_5566_7788);
        let bytes = header.to_bytes();
        assert_eq!(
            bytes,
            [0x03, 0x00, 0x01, 0x02, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
        assert_eq!(UdpHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_udp_header_too_short() {
        let result = UdpHeader::from_bytes(&[0x01, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(PacketError::TooShort {
                expected: 12,
                actual: 3
            })
        );
    }

    #[test]
    fn test_peek_invalid_type() {
        assert_eq!(peek_packet_type(&[0x7F]), Err(PacketError::InvalidType(0x7F)));
        assert!(matches!(peek_packet_type(&[]), Err(PacketError::TooShort { .. })));
    }
}
