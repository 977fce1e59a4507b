//! UDP packets.
//!
//! Every UDP packet carries the 12-byte [`UdpHeader`] with the sender's
//! packet sequence and authorisation code. Variable-length packets end with
//! the end-of-transmission byte.

use crate::core::END_OF_TRANSMISSION;

use super::error::PacketError;
use super::frame::{sizes, PacketType, UdpHeader};
use super::record::{RecordSet, SampleAcknowledgement, StationInfoRecord};

/// Payload of a UDP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdpPayload {
    /// Ask the server for the station list.
    StationInfoRequest,
    /// The stations the authorisation code may submit data for.
    StationInfoResponse(Vec<StationInfoRecord>),
    /// Live and sample records.
    WeatherData(RecordSet),
    /// Samples committed by the server.
    SampleAcknowledgement {
        /// How many of the last 256 live records arrived late or not at all.
        lost_live_records: u8,
        /// Acknowledged samples.
        acknowledgements: Vec<SampleAcknowledgement>,
    },
}

impl UdpPayload {
    /// Packet type for this payload.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::StationInfoRequest => PacketType::StationInfoRequest,
            Self::StationInfoResponse(_) => PacketType::StationInfoResponse,
            Self::WeatherData(_) => PacketType::WeatherDataUdp,
            Self::SampleAcknowledgement { .. } => PacketType::SampleAcknowledgementUdp,
        }
    }
}

/// A UDP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    /// Packet sequence number.
    pub sequence: u16,
    /// Client authorisation code.
    pub authorisation_code: u64,
    /// Packet payload.
    pub payload: UdpPayload,
}

impl UdpPacket {
    /// Create a new UDP packet.
    pub fn new(sequence: u16, authorisation_code: u64, payload: UdpPayload) -> Self {
        Self {
            sequence,
            authorisation_code,
            payload,
        }
    }

    /// Packet header.
    pub fn header(&self) -> UdpHeader {
        UdpHeader::new(self.payload.packet_type(), self.sequence, self.authorisation_code)
    }

    /// Encode the packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(sizes::UDP_HEADER_SIZE + 64);
        out.extend_from_slice(&self.header().to_bytes());

        match &self.payload {
            UdpPayload::StationInfoRequest => return out,
            UdpPayload::StationInfoResponse(stations) => {
                for station in stations {
                    out.extend_from_slice(&station.to_bytes());
                }
            }
            UdpPayload::WeatherData(records) => out.extend_from_slice(records.as_bytes()),
            UdpPayload::SampleAcknowledgement {
                lost_live_records,
                acknowledgements,
            } => {
                out.push(*lost_live_records);
                for ack in acknowledgements {
                    out.extend_from_slice(&ack.to_bytes());
                }
            }
        }

        out.push(END_OF_TRANSMISSION);
        out
    }

    /// Decode a datagram.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let header = UdpHeader::from_bytes(data)?;
        let body = &data[sizes::UDP_HEADER_SIZE..];

        let payload = match header.packet_type {
            PacketType::StationInfoRequest => UdpPayload::StationInfoRequest,
            PacketType::StationInfoResponse => {
                let stations = fixed_records(body, sizes::STATION_INFO_RECORD_SIZE)?
                    .map(StationInfoRecord::from_bytes)
                    .collect::<Result<_, _>>()?;
                UdpPayload::StationInfoResponse(stations)
            }
            PacketType::WeatherDataUdp => {
                let (&last, records) = body.split_last().ok_or(PacketError::MissingEndOfTransmission)?;
                if last != END_OF_TRANSMISSION {
                    return Err(PacketError::MissingEndOfTransmission);
                }
                UdpPayload::WeatherData(RecordSet::from_bytes(records.to_vec()))
            }
            PacketType::SampleAcknowledgementUdp => {
                let (&lost_live_records, rest) = body.split_first().ok_or(PacketError::TooShort {
                    expected: sizes::UDP_HEADER_SIZE + 2,
                    actual: data.len(),
                })?;
                let acknowledgements = fixed_records(rest, sizes::SAMPLE_ACK_RECORD_SIZE)?
                    .map(SampleAcknowledgement::from_bytes)
                    .collect::<Result<_, _>>()?;
                UdpPayload::SampleAcknowledgement {
                    lost_live_records,
                    acknowledgements,
                }
            }
            other => return Err(PacketError::UnexpectedType(other.as_byte())),
        };

        Ok(Self::new(header.sequence, header.authorisation_code, payload))
    }
}

/// Split an end-of-transmission terminated list of fixed-size records.
fn fixed_records(data: &[u8], size: usize) -> Result<std::slice::Chunks<'_, u8>, PacketError> {
    let (&last, records) = data.split_last().ok_or(PacketError::MissingEndOfTransmission)?;
    if last != END_OF_TRANSMISSION {
        return Err(PacketError::MissingEndOfTransmission);
    }
    if records.len() % size != 0 {
        return Err(PacketError::LengthMismatch {
            expected: records.len().next_multiple_of(size),
            actual: records.len(),
        });
    }
    Ok(records.chunks(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_fields, all_live_fields, live_table, Fields, Timestamp};
    use crate::core::{HardwareType, StationCode};
    use crate::transport::{LiveDataRecord, WeatherRecord};

    const AUTH: u64 = 0x0123_4567_89AB_CDEF;

    fn stations() -> Vec<StationInfoRecord> {
        vec![
            StationInfoRecord::new(StationCode::new("abcde").unwrap(), HardwareType::Davis, 1).unwrap(),
            StationInfoRecord::new(StationCode::new("fghij").unwrap(), HardwareType::Fowh1080, 2)
                .unwrap(),
        ]
    }

    #[test]
    fn test_station_info_request() {
        let packet = UdpPacket::new(1, AUTH, UdpPayload::StationInfoRequest);
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 12);
        assert_eq!(UdpPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_station_info_response_roundtrip() {
        let packet = UdpPacket::new(2, AUTH, UdpPayload::StationInfoResponse(stations()));
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 12 + 14 + 1);
        assert_eq!(bytes.last(), Some(&END_OF_TRANSMISSION));

        let decoded = UdpPacket::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
        let UdpPayload::StationInfoResponse(list) = decoded.payload else {
            panic!("wrong payload");
        };
        assert_eq!(list, stations());
    }

    #[test]
    fn test_sample_acknowledgement_roundtrip() {
        let packet = UdpPacket::new(
            3,
            AUTH,
            UdpPayload::SampleAcknowledgement {
                lost_live_records: 4,
                acknowledgements: vec![
                    SampleAcknowledgement::new(1, Timestamp::from_secs(1_420_070_400)),
                    SampleAcknowledgement::new(2, Timestamp::from_secs(1_420_070_700)),
                ],
            },
        );
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 12 + 1 + 10 + 1);
        assert_eq!(UdpPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_weather_data_single_record_ending_in_eot() {
        let hw = HardwareType::Generic;
        // Wind direction 260 encodes as 01 04, so the record's last byte is 0x04.
        let fields = Fields::new()
            .with("indoor_humidity", 45u8)
            .with("indoor_temperature", 21.5)
            .with("temperature", 12.5)
            .with("humidity", 80u8)
            .with("pressure", 1013.2)
            .with("msl_pressure", 1020.1)
            .with("average_wind_speed", 3.4)
            .with("gust_wind_speed", 7.9)
            .with("wind_direction", 260u16);
        let selection = all_live_fields(hw);
        let record = WeatherRecord::Live(LiveDataRecord {
            station_id: 1,
            sequence: 1,
            field_mask: selection.fields,
            field_data: encode_fields(&fields, live_table(hw), &selection).unwrap(),
        });
        assert_eq!(record.encode().last(), Some(&END_OF_TRANSMISSION));

        let packet = UdpPacket::new(
            4,
            AUTH,
            UdpPayload::WeatherData(RecordSet::from_records(std::slice::from_ref(&record))),
        );
        let decoded = UdpPacket::decode(&packet.encode()).unwrap();
        let UdpPayload::WeatherData(set) = decoded.payload else {
            panic!("wrong payload");
        };
        assert_eq!(set.decode(|_| Some(hw)).unwrap(), vec![record]);
    }

    #[test]
    fn test_missing_end_of_transmission() {
        let mut bytes = UdpPacket::new(2, AUTH, UdpPayload::StationInfoResponse(stations())).encode();
        bytes.pop();
        assert_eq!(UdpPacket::decode(&bytes), Err(PacketError::MissingEndOfTransmission));
    }

    #[test]
    fn test_partial_station_record() {
        let mut bytes = UdpPacket::new(2, AUTH, UdpPayload::StationInfoResponse(stations())).encode();
        bytes.remove(bytes.len() - 2);
        assert!(matches!(
            UdpPacket::decode(&bytes),
            Err(PacketError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_tcp_packet_type_rejected() {
        let mut bytes = UdpPacket::new(1, AUTH, UdpPayload::StationInfoRequest).encode();
        bytes[0] = 0x07;
        assert_eq!(UdpPacket::decode(&bytes), Err(PacketError::UnexpectedType(0x07)));
    }
}
