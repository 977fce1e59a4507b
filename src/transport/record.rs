//! Weather records as carried inside weather data packets.
//!
//! Records have no length on the wire. Inside a packet they are separated by
//! the record separator byte, which may also occur in field data, so the
//! only safe split points are those where the bytes seen so far form a
//! record of exactly the size its header implies.

use crate::codec::{
    calculate_encoded_size, decode_fields, live_table, sample_table, selection_of, FieldMask,
    FieldTable, Fields, Timestamp,
};
use crate::core::{
    DecodeError, HardwareType, StationCode, ValueError, MAX_STATION_RECORD_ID, RECORD_SEPARATOR,
    RECORD_TYPE_LIVE, RECORD_TYPE_SAMPLE,
};

use super::error::PacketError;
use super::frame::{ensure_len, read_u16, read_u32, sizes};

/// A live record on the wire.
///
/// Wire format:
/// ```text
/// +--------+------------+-------------+-------------+------------+
/// | 0x01   | Station ID | Sequence    | Field mask  | Field data |
/// | 1 byte | 1 byte     | 2 bytes     | 4 bytes     | ...        |
/// +--------+------------+-------------+-------------+------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDataRecord {
    /// Server-assigned station id.
    pub station_id: u8,
    /// Live sequence id.
    pub sequence: u16,
    /// Fields present in `field_data`.
    pub field_mask: FieldMask,
    /// Encoded field data.
    pub field_data: Vec<u8>,
}

/// A sample record on the wire.
///
/// Wire format:
/// ```text
/// +--------+------------+-----------+--------------------+------------+------------+
/// | 0x02   | Station ID | Timestamp | Download timestamp | Field mask | Field data |
/// | 1 byte | 1 byte     | 4 bytes   | 4 bytes            | 4 bytes    | ...        |
/// +--------+------------+-----------+--------------------+------------+------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDataRecord {
    /// Server-assigned station id.
    pub station_id: u8,
    /// When the sample was taken.
    pub timestamp: Timestamp,
    /// When the sample was downloaded from the station.
    pub download_timestamp: Timestamp,
    /// Fields present in `field_data`.
    pub field_mask: FieldMask,
    /// Encoded field data.
    pub field_data: Vec<u8>,
}

/// A record inside a weather data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherRecord {
    /// Live record.
    Live(LiveDataRecord),
    /// Sample record.
    Sample(SampleDataRecord),
}

impl WeatherRecord {
    /// Record type byte.
    pub fn record_type(&self) -> u8 {
        match self {
            Self::Live(_) => RECORD_TYPE_LIVE,
            Self::Sample(_) => RECORD_TYPE_SAMPLE,
        }
    }

    /// Server-assigned station id.
    pub fn station_id(&self) -> u8 {
        match self {
            Self::Live(r) => r.station_id,
            Self::Sample(r) => r.station_id,
        }
    }

    /// Fields present in the field data.
    pub fn field_mask(&self) -> FieldMask {
        match self {
            Self::Live(r) => r.field_mask,
            Self::Sample(r) => r.field_mask,
        }
    }

    /// Encoded field data.
    pub fn field_data(&self) -> &[u8] {
        match self {
            Self::Live(r) => &r.field_data,
            Self::Sample(r) => &r.field_data,
        }
    }

    /// Header size for this record type.
    pub fn header_size(&self) -> usize {
        header_size(self.record_type()).unwrap_or_default()
    }

    /// Size of the encoded record.
    pub fn encoded_size(&self) -> usize {
        self.header_size() + self.field_data().len()
    }

    /// Field table the record's data was encoded with.
    pub fn table(&self, hardware: HardwareType) -> &'static FieldTable {
        table_for(self.record_type(), hardware)
    }

    /// Decode the field data.
    pub fn fields(&self, hardware: HardwareType) -> Result<Fields, DecodeError> {
        decode_fields(self.field_data(), self.table(hardware), self.field_mask())
    }

    /// Append the encoded record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.record_type());
        out.push(self.station_id());
        match self {
            Self::Live(r) => out.extend_from_slice(&r.sequence.to_be_bytes()),
            Self::Sample(r) => {
                out.extend_from_slice(&r.timestamp.as_secs().to_be_bytes());
                out.extend_from_slice(&r.download_timestamp.as_secs().to_be_bytes());
            }
        }
        out.extend_from_slice(&self.field_mask().bits().to_be_bytes());
        out.extend_from_slice(self.field_data());
    }

    /// Encode the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut out);
        out
    }

    /// Decode a record occupying all of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let record_type = *data.first().ok_or(PacketError::TooShort {
            expected: 1,
            actual: 0,
        })?;
        let header = header_size(record_type).ok_or(PacketError::InvalidRecordType(record_type))?;
        ensure_len(data, header)?;

        let station_id = data[1];
        let field_data = data[header..].to_vec();
        match record_type {
            RECORD_TYPE_LIVE => Ok(Self::Live(LiveDataRecord {
                station_id,
                sequence: read_u16(&data[2..4]),
                field_mask: FieldMask::from_bits(read_u32(&data[4..8])),
                field_data,
            })),
            _ => Ok(Self::Sample(SampleDataRecord {
                station_id,
                timestamp: Timestamp::from_secs(read_u32(&data[2..6])),
                download_timestamp: Timestamp::from_secs(read_u32(&data[6..10])),
                field_mask: FieldMask::from_bits(read_u32(&data[10..14])),
                field_data,
            })),
        }
    }
}

fn header_size(record_type: u8) -> Option<usize> {
    match record_type {
        RECORD_TYPE_LIVE => Some(sizes::LIVE_RECORD_HEADER_SIZE),
        RECORD_TYPE_SAMPLE => Some(sizes::SAMPLE_RECORD_HEADER_SIZE),
        _ => None,
    }
}

fn table_for(record_type: u8, hardware: HardwareType) -> &'static FieldTable {
    if record_type == RECORD_TYPE_LIVE {
        live_table(hardware)
    } else {
        sample_table(hardware)
    }
}

/// Size the record starting at `data[0]` must have, according to its header.
///
/// Returns `None` when `data` is too short to tell.
pub fn expected_record_size<F>(data: &[u8], hardware_of: &F) -> Result<Option<usize>, PacketError>
where
    F: Fn(u8) -> Option<HardwareType>,
{
    let Some(&record_type) = data.first() else {
        return Ok(None);
    };
    let header = header_size(record_type).ok_or(PacketError::InvalidRecordType(record_type))?;
    if data.len() < header {
        return Ok(None);
    }

    let station_id = data[1];
    let hardware = hardware_of(station_id).ok_or(PacketError::UnknownStation(station_id))?;
    let table = table_for(record_type, hardware);
    let mask = FieldMask::from_bits(read_u32(&data[header - 4..header]));

    Ok(selection_of(&data[header..], table, mask)?
        .map(|selection| header + calculate_encoded_size(table, &selection)))
}

/// Append `records` as a record set: a lone record as is, several records
/// each followed by the record separator.
pub fn encode_record_set(records: &[WeatherRecord], out: &mut Vec<u8>) {
    if let [record] = records {
        record.encode_into(out);
        return;
    }
    for record in records {
        record.encode_into(out);
        out.push(RECORD_SEPARATOR);
    }
}

/// Split a record set into records.
///
/// Every record separator is a candidate record boundary, as is the end of
/// `data`. A candidate is accepted only when the bytes before it form a
/// record of exactly its computed size; shorter means the separator was
/// field data.
pub fn decode_record_set<F>(data: &[u8], hardware_of: F) -> Result<Vec<WeatherRecord>, PacketError>
where
    F: Fn(u8) -> Option<HardwareType>,
{
    let mut records = Vec::new();
    let mut start = 0;

    while start < data.len() {
        let mut search = start;
        loop {
            let separator = data[search..]
                .iter()
                .position(|&b| b == RECORD_SEPARATOR)
                .map(|p| search + p);
            let boundary = separator.unwrap_or(data.len());
            let chunk = &data[start..boundary];

            match expected_record_size(chunk, &hardware_of)? {
                Some(size) if size == chunk.len() => {
                    records.push(WeatherRecord::decode(chunk)?);
                    start = separator.map_or(data.len(), |s| s + 1);
                    break;
                }
                Some(size) if size < chunk.len() => {
                    return Err(PacketError::MisplacedSeparator {
                        offset: start + size,
                    });
                }
                _ => match separator {
                    Some(s) => search = s + 1,
                    None => return Err(PacketError::IncompleteRecord),
                },
            }
        }
    }

    Ok(records)
}

/// The still-encoded records of a weather data packet.
///
/// Splitting records needs each station's hardware type, which is not in
/// the packet, so packet decoding stops here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordSet(Vec<u8>);

impl RecordSet {
    /// Encode `records` into a record set.
    pub fn from_records(records: &[WeatherRecord]) -> Self {
        let mut data = Vec::new();
        encode_record_set(records, &mut data);
        Self(data)
    }

    /// Wrap an encoded record set.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no records.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into records, looking up station hardware with `hardware_of`.
    pub fn decode<F>(&self, hardware_of: F) -> Result<Vec<WeatherRecord>, PacketError>
    where
        F: Fn(u8) -> Option<HardwareType>,
    {
        decode_record_set(&self.0, hardware_of)
    }
}

/// One entry of a station list.
///
/// Wire format (7 bytes): five-byte NUL-padded station code, hardware type
/// id, station id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationInfoRecord {
    /// Station code.
    pub station_code: StationCode,
    /// Hardware class.
    pub hardware_type: HardwareType,
    /// Server-assigned station id, 0-254.
    pub station_id: u8,
}

impl StationInfoRecord {
    /// Create a station info record.
    pub fn new(
        station_code: StationCode,
        hardware_type: HardwareType,
        station_id: u8,
    ) -> Result<Self, ValueError> {
        if station_id > MAX_STATION_RECORD_ID {
            return Err(ValueError::StationIdOutOfRange(station_id));
        }
        Ok(Self {
            station_code,
            hardware_type,
            station_id,
        })
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; sizes::STATION_INFO_RECORD_SIZE] {
        let mut buf = [0u8; sizes::STATION_INFO_RECORD_SIZE];
        buf[..5].copy_from_slice(&self.station_code.to_bytes());
        buf[5] = self.hardware_type.as_byte();
        buf[6] = self.station_id;
        buf
    }

    /// Parse from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        ensure_len(bytes, sizes::STATION_INFO_RECORD_SIZE)?;
        let mut code = [0u8; 5];
        code.copy_from_slice(&bytes[..5]);
        let station_code = StationCode::from_bytes(&code)?;
        let hardware_type = HardwareType::try_from(bytes[5])?;
        Ok(Self::new(station_code, hardware_type, bytes[6])?)
    }
}

/// An image type or image source code and its server id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMapEntry {
    /// Code, up to five bytes.
    pub code: StationCode,
    /// Server-assigned id.
    pub id: u8,
}

impl CodeMapEntry {
    /// Create a code map entry.
    pub fn new(code: StationCode, id: u8) -> Self {
        Self { code, id }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; sizes::CODE_MAP_RECORD_SIZE] {
        let mut buf = [0u8; sizes::CODE_MAP_RECORD_SIZE];
        buf[..5].copy_from_slice(&self.code.to_bytes());
        buf[5] = self.id;
        buf
    }

    /// Parse from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        ensure_len(bytes, sizes::CODE_MAP_RECORD_SIZE)?;
        let mut code = [0u8; 5];
        code.copy_from_slice(&bytes[..5]);
        Ok(Self::new(StationCode::from_bytes(&code)?, bytes[5]))
    }
}

/// A sample the server has committed to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleAcknowledgement {
    /// Server-assigned station id.
    pub station_id: u8,
    /// Timestamp of the acknowledged sample.
    pub timestamp: Timestamp,
}

impl SampleAcknowledgement {
    /// Create an acknowledgement.
    pub fn new(station_id: u8, timestamp: Timestamp) -> Self {
        Self {
            station_id,
            timestamp,
        }
    }

    /// Serialize to bytes (timestamp first).
    pub fn to_bytes(&self) -> [u8; sizes::SAMPLE_ACK_RECORD_SIZE] {
        let mut buf = [0u8; sizes::SAMPLE_ACK_RECORD_SIZE];
        buf[..4].copy_from_slice(&self.timestamp.as_secs().to_be_bytes());
        buf[4] = self.station_id;
        buf
    }

    /// Parse from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        ensure_len(bytes, sizes::SAMPLE_ACK_RECORD_SIZE)?;
        Ok(Self::new(bytes[4], Timestamp::from_secs(read_u32(bytes))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_fields, all_live_fields, all_sample_fields, FieldSelection};

    fn generic(_: u8) -> Option<HardwareType> {
        Some(HardwareType::Generic)
    }

    fn live_fields() -> Fields {
        Fields::new()
            .with("indoor_humidity", 45u8)
            .with("indoor_temperature", 21.5)
            .with("temperature", 12.5)
            .with("humidity", 80u8)
            .with("pressure", 1013.2)
            .with("msl_pressure", 1020.1)
            .with("average_wind_speed", 3.4)
            .with("gust_wind_speed", 7.9)
            .with("wind_direction", 270u16)
    }

    fn live_record(station_id: u8, sequence: u16, fields: &Fields) -> WeatherRecord {
        let selection = all_live_fields(HardwareType::Generic);
        WeatherRecord::Live(LiveDataRecord {
            station_id,
            sequence,
            field_mask: selection.fields,
            field_data: encode_fields(fields, live_table(HardwareType::Generic), &selection).unwrap(),
        })
    }

    fn sample_record(station_id: u8, secs: u32, fields: &Fields) -> WeatherRecord {
        let selection = all_sample_fields(HardwareType::Generic);
        WeatherRecord::Sample(SampleDataRecord {
            station_id,
            timestamp: Timestamp::from_secs(secs),
            download_timestamp: Timestamp::from_secs(secs + 10),
            field_mask: selection.fields,
            field_data: encode_fields(fields, sample_table(HardwareType::Generic), &selection).unwrap(),
        })
    }

    #[test]
    fn test_live_header_layout() {
        let record = WeatherRecord::Live(LiveDataRecord {
            station_id: 7,
            sequence: 0x0102,
            field_mask: FieldMask::from_bits(0b101),
            field_data: vec![0xAA],
        });
        assert_eq!(
            record.encode(),
            vec![0x01, 7, 0x01, 0x02, 0x00, 0x00, 0x00, 0x05, 0xAA]
        );
        assert_eq!(record.header_size(), 8);
        assert_eq!(WeatherRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn test_sample_header_layout() {
        let record = WeatherRecord::Sample(SampleDataRecord {
            station_id: 3,
            timestamp: Timestamp::from_secs(1),
            download_timestamp: Timestamp::from_secs(2),
            field_mask: FieldMask::EMPTY,
            field_data: Vec::new(),
        });
        let bytes = record.encode();
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[..6], &[0x02, 3, 0, 0, 0, 1]);
        assert_eq!(WeatherRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_record_set_roundtrip() {
        let records = vec![
            sample_record(1, 1_000, &live_fields().with("rainfall", 0.2)),
            live_record(1, 5, &live_fields()),
            live_record(2, 9, &live_fields().with("temperature", -4.0)),
        ];
        let mut data = Vec::new();
        encode_record_set(&records, &mut data);
        assert_eq!(data.last(), Some(&RECORD_SEPARATOR));

        assert_eq!(decode_record_set(&data, generic).unwrap(), records);
    }

    #[test]
    fn test_single_record_has_no_separator() {
        let records = vec![live_record(1, 5, &live_fields())];
        let mut data = Vec::new();
        encode_record_set(&records, &mut data);
        assert_eq!(data.len(), records[0].encoded_size());
        assert_eq!(decode_record_set(&data, generic).unwrap(), records);
    }

    #[test]
    fn test_separator_inside_field_data() {
        // 0x1E as indoor humidity, wind direction and the live sequence id.
        let fields = live_fields()
            .with("indoor_humidity", 0x1Eu8)
            .with("wind_direction", 0x1Eu16);
        let records = vec![
            live_record(1, 0x1E, &fields),
            sample_record(1, 0x1E1E_1E1E, &fields.clone().with("rainfall", 0.0)),
        ];
        let mut data = Vec::new();
        encode_record_set(&records, &mut data);

        assert_eq!(decode_record_set(&data, generic).unwrap(), records);
    }

    #[test]
    fn test_unknown_station_is_an_error() {
        let mut data = Vec::new();
        encode_record_set(&[live_record(9, 1, &live_fields())], &mut data);
        let result = decode_record_set(&data, |id| (id == 1).then_some(HardwareType::Generic));
        assert_eq!(result, Err(PacketError::UnknownStation(9)));
    }

    #[test]
    fn test_invalid_record_type() {
        assert_eq!(
            decode_record_set(&[0x07, 0x01], generic),
            Err(PacketError::InvalidRecordType(0x07))
        );
    }

    #[test]
    fn test_truncated_record_set() {
        let mut data = live_record(1, 1, &live_fields()).encode();
        data.pop();
        assert_eq!(decode_record_set(&data, generic), Err(PacketError::IncompleteRecord));
    }

    #[test]
    fn test_misplaced_separator() {
        let mut data = live_record(1, 1, &live_fields()).encode();
        data.push(0x00);
        data.push(RECORD_SEPARATOR);
        assert!(matches!(
            decode_record_set(&data, generic),
            Err(PacketError::MisplacedSeparator { .. })
        ));
    }

    #[test]
    fn test_expected_size_waits_for_header() {
        assert_eq!(expected_record_size(&[0x01, 0x01, 0x00], &generic), Ok(None));
        let record = live_record(1, 1, &live_fields());
        let bytes = record.encode();
        assert_eq!(expected_record_size(&bytes, &generic), Ok(Some(bytes.len())));
    }

    #[test]
    fn test_subfield_record_size() {
        let hw = HardwareType::Davis;
        let selection = FieldSelection::new(FieldMask::EMPTY.with(crate::codec::EXTRA_FIELDS_ID))
            .with_subfields(crate::codec::EXTRA_FIELDS_ID, FieldMask::EMPTY.with(5).with(6));
        let fields = Fields::new().with(
            "extra_fields",
            Fields::new().with("soil_moisture_1", 0x1Eu8).with("soil_moisture_2", 0x1Eu8),
        );
        let record = WeatherRecord::Sample(SampleDataRecord {
            station_id: 4,
            timestamp: Timestamp::from_secs(60),
            download_timestamp: Timestamp::from_secs(61),
            field_mask: selection.fields,
            field_data: encode_fields(&fields, sample_table(hw), &selection).unwrap(),
        });
        let records = vec![record.clone(), record];
        let mut data = Vec::new();
        encode_record_set(&records, &mut data);

        let decoded = decode_record_set(&data, |_| Some(hw)).unwrap();
        assert_eq!(decoded, records);
        assert_eq!(decoded[0].fields(hw).unwrap(), fields);
    }

    #[test]
    fn test_station_info_record() {
        let record = StationInfoRecord::new(
            StationCode::new("abcde").unwrap(),
            HardwareType::Davis,
            1,
        )
        .unwrap();
        assert_eq!(record.to_bytes(), *b"abcde\x03\x01");
        assert_eq!(StationInfoRecord::from_bytes(&record.to_bytes()).unwrap(), record);

        assert_eq!(
            StationInfoRecord::new(StationCode::new("x").unwrap(), HardwareType::Generic, 255),
            Err(ValueError::StationIdOutOfRange(255))
        );
        assert!(matches!(
            StationInfoRecord::from_bytes(b"abcde\x09\x01"),
            Err(PacketError::Value(ValueError::UnknownHardwareTypeId(9)))
        ));
    }

    #[test]
    fn test_sample_acknowledgement_layout() {
        let ack = SampleAcknowledgement::new(2, Timestamp::from_secs(0x0102_0304));
        assert_eq!(ack.to_bytes(), [1, 2, 3, 4, 2]);
        assert_eq!(SampleAcknowledgement::from_bytes(&ack.to_bytes()).unwrap(), ack);
    }
}
