//! Per-transport packet construction and parsing for the client.
//!
//! The client core speaks in [`WeatherRecord`]s and [`ServerMessage`]s; a
//! [`WireFormat`] turns those into TCP or UDP packets and back.

use std::fmt;

use crate::sync::Sequencer;
use crate::transport::{
    PacketError, PacketType, RecordSet, SampleAcknowledgement, StationInfo, TcpPacket,
    TcpStreamDecoder, UdpPacket, UdpPayload, WeatherRecord,
};

use super::config::Protocol;

/// A packet from the server, reduced to what the client acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Stations the client may submit data for.
    StationInfo(StationInfo),
    /// Samples the server has stored.
    SampleAcknowledgement {
        /// Late or missing live records among the last 256 (UDP only).
        lost_live_records: Option<u8>,
        /// Acknowledged samples.
        acknowledgements: Vec<SampleAcknowledgement>,
    },
    /// The authorisation code was rejected.
    AuthenticationFailed,
    /// Anything else; ignored by the client.
    Other(PacketType),
}

/// Builds outgoing packets and parses incoming ones for one transport.
pub trait WireFormat: Send + fmt::Debug {
    /// Transport this format belongs to.
    fn protocol(&self) -> Protocol;

    /// Packet announcing the client: authenticate on TCP, a station info
    /// request on UDP.
    fn handshake(&mut self) -> Result<Vec<u8>, PacketError>;

    /// Packet carrying `records`.
    fn weather_data(&mut self, records: &[WeatherRecord]) -> Result<Vec<u8>, PacketError>;

    /// Parse received bytes into messages.
    fn decode(&mut self, data: &[u8]) -> Vec<Result<ServerMessage, PacketError>>;

    /// Drop any per-connection state.
    fn reset(&mut self);
}

/// Build the wire format for `protocol`.
pub fn wire_format(protocol: Protocol, authorisation_code: u64) -> Box<dyn WireFormat> {
    match protocol {
        Protocol::Tcp => Box::new(TcpFormat::new(authorisation_code)),
        Protocol::Udp => Box::new(UdpFormat::new(authorisation_code)),
    }
}

/// Length-prefixed packets over a byte stream.
#[derive(Debug)]
pub struct TcpFormat {
    authorisation_code: u64,
    decoder: TcpStreamDecoder,
}

impl TcpFormat {
    /// Create a TCP wire format.
    pub fn new(authorisation_code: u64) -> Self {
        Self {
            authorisation_code,
            decoder: TcpStreamDecoder::new(),
        }
    }
}

impl WireFormat for TcpFormat {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn handshake(&mut self) -> Result<Vec<u8>, PacketError> {
        TcpPacket::Authenticate {
            authorisation_code: self.authorisation_code,
        }
        .encode()
    }

    fn weather_data(&mut self, records: &[WeatherRecord]) -> Result<Vec<u8>, PacketError> {
        TcpPacket::WeatherData(RecordSet::from_records(records)).encode()
    }

    fn decode(&mut self, data: &[u8]) -> Vec<Result<ServerMessage, PacketError>> {
        self.decoder
            .decode(data)
            .into_iter()
            .map(|packet| {
                packet.map(|packet| match packet {
                    TcpPacket::StationInfo(info) => ServerMessage::StationInfo(info),
                    TcpPacket::SampleAcknowledgement(acknowledgements) => {
                        ServerMessage::SampleAcknowledgement {
                            lost_live_records: None,
                            acknowledgements,
                        }
                    }
                    TcpPacket::AuthenticateFailed => ServerMessage::AuthenticationFailed,
                    other => ServerMessage::Other(other.packet_type()),
                })
            })
            .collect()
    }

    fn reset(&mut self) {
        self.decoder = TcpStreamDecoder::new();
    }
}

/// One packet per datagram, each carrying a packet sequence number.
#[derive(Debug)]
pub struct UdpFormat {
    authorisation_code: u64,
    sequencer: Sequencer,
}

impl UdpFormat {
    /// Create a UDP wire format.
    pub fn new(authorisation_code: u64) -> Self {
        Self {
            authorisation_code,
            sequencer: Sequencer::new(),
        }
    }

    fn packet(&mut self, payload: UdpPayload) -> UdpPacket {
        UdpPacket::new(self.sequencer.next(), self.authorisation_code, payload)
    }
}

impl WireFormat for UdpFormat {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn handshake(&mut self) -> Result<Vec<u8>, PacketError> {
        Ok(self.packet(UdpPayload::StationInfoRequest).encode())
    }

    fn weather_data(&mut self, records: &[WeatherRecord]) -> Result<Vec<u8>, PacketError> {
        Ok(self
            .packet(UdpPayload::WeatherData(RecordSet::from_records(records)))
            .encode())
    }

    fn decode(&mut self, data: &[u8]) -> Vec<Result<ServerMessage, PacketError>> {
        let message = UdpPacket::decode(data).map(|packet| match packet.payload {
            UdpPayload::StationInfoResponse(stations) => ServerMessage::StationInfo(StationInfo {
                stations,
                ..StationInfo::default()
            }),
            UdpPayload::SampleAcknowledgement {
                lost_live_records,
                acknowledgements,
            } => ServerMessage::SampleAcknowledgement {
                lost_live_records: Some(lost_live_records),
                acknowledgements,
            },
            other => ServerMessage::Other(other.packet_type()),
        });
        vec![message]
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Timestamp;
    use crate::core::{HardwareType, StationCode};
    use crate::transport::{LiveDataRecord, StationInfoRecord};

    const AUTH: u64 = 0x0102_0304_0506_0708;

    fn station_info() -> StationInfo {
        StationInfo {
            stations: vec![
                StationInfoRecord::new(StationCode::new("abcde").unwrap(), HardwareType::Generic, 1)
                    .unwrap(),
            ],
            ..StationInfo::default()
        }
    }

    fn live_record() -> WeatherRecord {
        WeatherRecord::Live(LiveDataRecord {
            station_id: 1,
            sequence: 1,
            field_mask: Default::default(),
            field_data: Vec::new(),
        })
    }

    #[test]
    fn test_tcp_handshake_is_authenticate() {
        let mut format = TcpFormat::new(AUTH);
        let bytes = format.handshake().unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(
            TcpPacket::decode(&bytes).unwrap(),
            TcpPacket::Authenticate {
                authorisation_code: AUTH
            }
        );
    }

    #[test]
    fn test_tcp_decode_split_reads() {
        let mut format = TcpFormat::new(AUTH);
        let mut bytes = TcpPacket::StationInfo(station_info()).encode().unwrap();
        bytes.extend(TcpPacket::AuthenticateFailed.encode().unwrap());

        assert!(format.decode(&bytes[..3]).is_empty());
        let messages: Vec<_> = format
            .decode(&bytes[3..])
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            messages,
            vec![
                ServerMessage::StationInfo(station_info()),
                ServerMessage::AuthenticationFailed
            ]
        );
    }

    #[test]
    fn test_tcp_acknowledgements() {
        let mut format = TcpFormat::new(AUTH);
        let ack = SampleAcknowledgement::new(1, Timestamp::from_secs(1_500_000_000));
        let bytes = TcpPacket::SampleAcknowledgement(vec![ack]).encode().unwrap();

        let messages = format.decode(&bytes);
        assert_eq!(
            messages,
            vec![Ok(ServerMessage::SampleAcknowledgement {
                lost_live_records: None,
                acknowledgements: vec![ack],
            })]
        );
    }

    #[test]
    fn test_udp_packet_sequence_advances() {
        let mut format = UdpFormat::new(AUTH);
        let first = UdpPacket::decode(&format.handshake().unwrap()).unwrap();
        let second = UdpPacket::decode(&format.weather_data(&[live_record()]).unwrap()).unwrap();

        assert_eq!(first.payload, UdpPayload::StationInfoRequest);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.authorisation_code, AUTH);
    }

    #[test]
    fn test_udp_decode_station_list_and_ack() {
        let mut format = UdpFormat::new(AUTH);
        let response = UdpPacket::new(
            1,
            AUTH,
            UdpPayload::StationInfoResponse(station_info().stations),
        );
        assert_eq!(
            format.decode(&response.encode()),
            vec![Ok(ServerMessage::StationInfo(station_info()))]
        );

        let ack = UdpPacket::new(
            2,
            AUTH,
            UdpPayload::SampleAcknowledgement {
                lost_live_records: 3,
                acknowledgements: vec![],
            },
        );
        assert_eq!(
            format.decode(&ack.encode()),
            vec![Ok(ServerMessage::SampleAcknowledgement {
                lost_live_records: Some(3),
                acknowledgements: vec![],
            })]
        );
    }

    #[test]
    fn test_udp_garbage_is_an_error() {
        let mut format = UdpFormat::new(AUTH);
        let messages = format.decode(&[0x03, 0x00]);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_err());
    }
}
