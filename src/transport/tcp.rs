//! TCP packets and stream reassembly.
//!
//! TCP packets carry only the 2-byte type header; the authorisation code is
//! sent once in [`TcpPacket::Authenticate`]. Every variable-length packet
//! lets the receiver compute its size from a short prefix, which is how
//! [`TcpStreamDecoder`] cuts packets out of the byte stream.

use tracing::warn;

use crate::codec::Timestamp;
use crate::core::{ValueError, MAX_TCP_ACKNOWLEDGEMENTS, MAX_TCP_WEATHER_PACKET_SIZE, RECORD_SEPARATOR};

use super::error::PacketError;
use super::frame::{ensure_len, peek_packet_type, read_u16, read_u32, sizes, tcp_header, PacketType};
use super::record::{CodeMapEntry, RecordSet, SampleAcknowledgement, StationInfoRecord};

/// Station list plus the image type and image source code maps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StationInfo {
    /// Stations the client may submit data for.
    pub stations: Vec<StationInfoRecord>,
    /// Image type codes.
    pub image_types: Vec<CodeMapEntry>,
    /// Image source codes.
    pub image_sources: Vec<CodeMapEntry>,
}

/// An image upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    /// Image type id from the station info code map.
    pub image_type_id: u8,
    /// Image source id from the station info code map.
    pub image_source_id: u8,
    /// When the image was taken.
    pub timestamp: Timestamp,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// MIME type.
    pub mime_type: String,
    /// Free-form metadata.
    pub metadata: String,
    /// Image bytes.
    pub data: Vec<u8>,
}

/// An image the server has stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageAcknowledgement {
    /// Image source id.
    pub image_source_id: u8,
    /// Image type id.
    pub image_type_id: u8,
    /// Timestamp of the acknowledged image.
    pub timestamp: Timestamp,
}

/// A TCP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpPacket {
    /// Client authorisation code, sent once after connecting.
    Authenticate {
        /// The authorisation code.
        authorisation_code: u64,
    },
    /// Station list and image code maps.
    StationInfo(StationInfo),
    /// Live and sample records.
    WeatherData(RecordSet),
    /// Samples committed by the server.
    SampleAcknowledgement(Vec<SampleAcknowledgement>),
    /// The authorisation code was rejected.
    AuthenticateFailed,
    /// Image upload.
    Image(Image),
    /// Images stored by the server.
    ImageAcknowledgement(Vec<ImageAcknowledgement>),
}

impl TcpPacket {
    /// Sample acknowledgement packet, refusing more than 255 records.
    pub fn sample_acknowledgements(acks: Vec<SampleAcknowledgement>) -> Result<Self, ValueError> {
        if acks.len() > MAX_TCP_ACKNOWLEDGEMENTS {
            return Err(ValueError::TooManyAcknowledgements {
                max: MAX_TCP_ACKNOWLEDGEMENTS,
            });
        }
        Ok(Self::SampleAcknowledgement(acks))
    }

    /// Packet type for this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Authenticate { .. } => PacketType::Authenticate,
            Self::StationInfo(_) => PacketType::StationInfo,
            Self::WeatherData(_) => PacketType::WeatherDataTcp,
            Self::SampleAcknowledgement(_) => PacketType::SampleAcknowledgementTcp,
            Self::AuthenticateFailed => PacketType::AuthenticateFailed,
            Self::Image(_) => PacketType::Image,
            Self::ImageAcknowledgement(_) => PacketType::ImageAcknowledgement,
        }
    }

    /// Encode the packet.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut out = tcp_header(self.packet_type()).to_vec();

        match self {
            Self::Authenticate { authorisation_code } => {
                out.extend_from_slice(&authorisation_code.to_be_bytes());
            }
            Self::StationInfo(info) => {
                for list_len in [info.stations.len(), info.image_types.len(), info.image_sources.len()] {
                    out.push(count_byte(list_len)?);
                }
                for station in &info.stations {
                    out.extend_from_slice(&station.to_bytes());
                }
                for entry in info.image_types.iter().chain(&info.image_sources) {
                    out.extend_from_slice(&entry.to_bytes());
                }
            }
            Self::WeatherData(records) => {
                let size = sizes::PACKET_HEADER_SIZE + sizes::TCP_LENGTH_SIZE + records.len();
                if size > MAX_TCP_WEATHER_PACKET_SIZE {
                    return Err(PacketError::TooLarge {
                        size,
                        max: MAX_TCP_WEATHER_PACKET_SIZE,
                    });
                }
                out.extend_from_slice(&(size as u16).to_be_bytes());
                out.extend_from_slice(records.as_bytes());
            }
            Self::SampleAcknowledgement(acks) => {
                if acks.len() > MAX_TCP_ACKNOWLEDGEMENTS {
                    return Err(ValueError::TooManyAcknowledgements {
                        max: MAX_TCP_ACKNOWLEDGEMENTS,
                    }
                    .into());
                }
                out.push(acks.len() as u8);
                for ack in acks {
                    out.extend_from_slice(&ack.to_bytes());
                }
            }
            Self::AuthenticateFailed => {}
            Self::Image(image) => encode_image(image, &mut out)?,
            Self::ImageAcknowledgement(images) => {
                out.push(count_byte(images.len())?);
                for image in images {
                    out.extend_from_slice(&image.timestamp.as_secs().to_be_bytes());
                    out.push(image.image_source_id);
                    out.push(image.image_type_id);
                }
            }
        }

        Ok(out)
    }

    /// Decode a complete packet.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let packet_type = peek_packet_type(data)?;
        if !packet_type.is_tcp() {
            return Err(PacketError::UnexpectedType(packet_type.as_byte()));
        }
        let expected = packet_size(data)?.ok_or(PacketError::TooShort {
            expected: bytes_required(packet_type),
            actual: data.len(),
        })?;
        if expected != data.len() {
            return Err(PacketError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }

        let body = &data[sizes::PACKET_HEADER_SIZE..];
        let packet = match packet_type {
            PacketType::Authenticate => Self::Authenticate {
                authorisation_code: u64::from_be_bytes([
                    body[0], body[1], body[2], body[3], body[4], body[5], body[6], body[7],
                ]),
            },
            PacketType::StationInfo => Self::StationInfo(decode_station_info(body)?),
            PacketType::WeatherDataTcp => {
                Self::WeatherData(RecordSet::from_bytes(body[sizes::TCP_LENGTH_SIZE..].to_vec()))
            }
            PacketType::SampleAcknowledgementTcp => Self::SampleAcknowledgement(
                body[1..]
                    .chunks(sizes::SAMPLE_ACK_RECORD_SIZE)
                    .map(SampleAcknowledgement::from_bytes)
                    .collect::<Result<_, _>>()?,
            ),
            PacketType::AuthenticateFailed => Self::AuthenticateFailed,
            PacketType::Image => Self::Image(decode_image(body)?),
            PacketType::ImageAcknowledgement => Self::ImageAcknowledgement(
                body[1..]
                    .chunks(sizes::IMAGE_ACK_RECORD_SIZE)
                    .map(|record| ImageAcknowledgement {
                        timestamp: Timestamp::from_secs(read_u32(record)),
                        image_source_id: record[4],
                        image_type_id: record[5],
                    })
                    .collect(),
            ),
            other => return Err(PacketError::UnexpectedType(other.as_byte())),
        };
        Ok(packet)
    }
}

fn count_byte(len: usize) -> Result<u8, PacketError> {
    u8::try_from(len).map_err(|_| PacketError::TooLarge {
        size: len,
        max: u8::MAX as usize,
    })
}

fn encode_image(image: &Image, out: &mut Vec<u8>) -> Result<(), PacketError> {
    let text = [
        image.title.as_bytes(),
        image.description.as_bytes(),
        image.mime_type.as_bytes(),
        image.metadata.as_bytes(),
    ]
    .join(&RECORD_SEPARATOR);
    let total = sizes::PACKET_HEADER_SIZE + sizes::IMAGE_PAYLOAD_HEADER_SIZE + text.len() + image.data.len();
    let too_large = || PacketError::TooLarge {
        size: total,
        max: u32::MAX as usize,
    };
    let total_len = u32::try_from(total).map_err(|_| too_large())?;
    let text_len = u32::try_from(text.len()).map_err(|_| too_large())?;

    out.extend_from_slice(&total_len.to_be_bytes());
    out.push(image.image_type_id);
    out.push(image.image_source_id);
    out.extend_from_slice(&image.timestamp.as_secs().to_be_bytes());
    out.extend_from_slice(&text_len.to_be_bytes());
    out.extend_from_slice(&text);
    out.extend_from_slice(&image.data);
    Ok(())
}

fn decode_image(body: &[u8]) -> Result<Image, PacketError> {
    ensure_len(body, sizes::IMAGE_PAYLOAD_HEADER_SIZE)?;
    let text_len = read_u32(&body[10..14]) as usize;
    let rest = &body[sizes::IMAGE_PAYLOAD_HEADER_SIZE..];
    ensure_len(rest, text_len)?;
    let (text, data) = rest.split_at(text_len);

    let mut parts = text.splitn(4, |&b| b == RECORD_SEPARATOR);
    let mut next_text = |name: &'static str| -> Result<String, PacketError> {
        let part = parts.next().unwrap_or_default();
        String::from_utf8(part.to_vec()).map_err(|_| PacketError::InvalidText(name))
    };

    Ok(Image {
        image_type_id: body[4],
        image_source_id: body[5],
        timestamp: Timestamp::from_secs(read_u32(&body[6..10])),
        title: next_text("image title")?,
        description: next_text("image description")?,
        mime_type: next_text("image mime type")?,
        metadata: next_text("image metadata")?,
        data: data.to_vec(),
    })
}

fn decode_station_info(body: &[u8]) -> Result<StationInfo, PacketError> {
    let (station_count, type_count, source_count) = (body[0] as usize, body[1] as usize, body[2] as usize);
    let stations_end = 3 + station_count * sizes::STATION_INFO_RECORD_SIZE;
    let types_end = stations_end + type_count * sizes::CODE_MAP_RECORD_SIZE;
    let sources_end = types_end + source_count * sizes::CODE_MAP_RECORD_SIZE;
    ensure_len(body, sources_end)?;

    Ok(StationInfo {
        stations: body[3..stations_end]
            .chunks(sizes::STATION_INFO_RECORD_SIZE)
            .map(StationInfoRecord::from_bytes)
            .collect::<Result<_, _>>()?,
        image_types: body[stations_end..types_end]
            .chunks(sizes::CODE_MAP_RECORD_SIZE)
            .map(CodeMapEntry::from_bytes)
            .collect::<Result<_, _>>()?,
        image_sources: body[types_end..sources_end]
            .chunks(sizes::CODE_MAP_RECORD_SIZE)
            .map(CodeMapEntry::from_bytes)
            .collect::<Result<_, _>>()?,
    })
}

/// Leading bytes of a packet of `packet_type` needed before its size can
/// be computed.
pub fn bytes_required(packet_type: PacketType) -> usize {
    match packet_type {
        PacketType::StationInfo => sizes::PACKET_HEADER_SIZE + 3,
        PacketType::WeatherDataTcp => sizes::PACKET_HEADER_SIZE + sizes::TCP_LENGTH_SIZE,
        PacketType::SampleAcknowledgementTcp | PacketType::ImageAcknowledgement => {
            sizes::PACKET_HEADER_SIZE + 1
        }
        PacketType::Image => sizes::PACKET_HEADER_SIZE + 4,
        _ => 1,
    }
}

/// Total size of the packet starting at `data[0]`, or `None` if more bytes
/// are needed to tell.
pub fn packet_size(data: &[u8]) -> Result<Option<usize>, PacketError> {
    let packet_type = peek_packet_type(data)?;
    if data.len() < bytes_required(packet_type) {
        return Ok(None);
    }

    let size = match packet_type {
        PacketType::Authenticate => sizes::AUTHENTICATE_PACKET_SIZE,
        PacketType::AuthenticateFailed => sizes::PACKET_HEADER_SIZE,
        PacketType::StationInfo => {
            sizes::PACKET_HEADER_SIZE
                + 3
                + data[2] as usize * sizes::STATION_INFO_RECORD_SIZE
                + (data[3] as usize + data[4] as usize) * sizes::CODE_MAP_RECORD_SIZE
        }
        PacketType::WeatherDataTcp => read_u16(&data[2..4]) as usize,
        PacketType::SampleAcknowledgementTcp => {
            sizes::PACKET_HEADER_SIZE + 1 + data[2] as usize * sizes::SAMPLE_ACK_RECORD_SIZE
        }
        PacketType::ImageAcknowledgement => {
            sizes::PACKET_HEADER_SIZE + 1 + data[2] as usize * sizes::IMAGE_ACK_RECORD_SIZE
        }
        PacketType::Image => read_u32(&data[2..6]) as usize,
        other => return Err(PacketError::UnexpectedType(other.as_byte())),
    };

    // A declared size shorter than the fixed prefix can never be satisfied.
    let minimum = match packet_type {
        PacketType::WeatherDataTcp => bytes_required(packet_type),
        PacketType::Image => sizes::PACKET_HEADER_SIZE + sizes::IMAGE_PAYLOAD_HEADER_SIZE,
        _ => 0,
    };
    if size < minimum {
        return Err(PacketError::LengthMismatch {
            expected: minimum,
            actual: size,
        });
    }
    Ok(Some(size))
}

/// Reassembles TCP packets from a byte stream.
#[derive(Debug, Default)]
pub struct TcpStreamDecoder {
    buffer: Vec<u8>,
}

impl TcpStreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet part of a complete packet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete packet, if there is one.
    ///
    /// A packet that fails to decode is returned as an error and skipped.
    /// When the framing itself is broken the buffer is discarded, as there
    /// is no way to find the next packet boundary.
    pub fn next_packet(&mut self) -> Option<Result<TcpPacket, PacketError>> {
        if self.buffer.is_empty() {
            return None;
        }

        let size = match packet_size(&self.buffer) {
            Ok(Some(size)) if size <= self.buffer.len() => size,
            Ok(_) => return None,
            Err(err) => {
                warn!(error = %err, discarded = self.buffer.len(), "unrecoverable framing error");
                self.buffer.clear();
                return Some(Err(err));
            }
        };

        let packet: Vec<u8> = self.buffer.drain(..size).collect();
        Some(TcpPacket::decode(&packet))
    }

    /// Append `data` and return every packet now complete.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Result<TcpPacket, PacketError>> {
        self.extend(data);
        std::iter::from_fn(|| self.next_packet()).collect()
    }
}
