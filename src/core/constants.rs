//! Protocol constants for the weather-push wire format.
//!
//! These values are fixed by the protocol and MUST NOT be changed. Tunable
//! client behaviour lives at the bottom of the file as `DEFAULT_*` values
//! that [`ClientConfig`](crate::client::ClientConfig) can override.

use std::time::Duration;

// =============================================================================
// FIELD IDS
// =============================================================================

/// Number of field slots in every field table (ids 0-31).
pub const FIELD_SLOT_COUNT: usize = 32;

/// Highest valid field id.
pub const MAX_FIELD_ID: u8 = 31;

/// Live diff marker: sequence id of the live record a diff was taken against.
pub const LIVE_DIFF_SEQUENCE_FIELD_ID: u8 = 0;

/// Sample diff marker: timestamp of the sample a diff was taken against.
pub const SAMPLE_DIFF_TIMESTAMP_FIELD_ID: u8 = 1;

/// Field name of the live diff marker.
pub const LIVE_DIFF_SEQUENCE_FIELD: &str = "live_diff_sequence";

/// Field name of the sample diff marker.
pub const SAMPLE_DIFF_TIMESTAMP_FIELD: &str = "sample_diff_timestamp";

/// Size of the bitmask that precedes a subfield set.
pub const SUBFIELD_HEADER_SIZE: usize = 4;

// =============================================================================
// NULL SENTINELS
// =============================================================================

/// Null value for signed 8-bit fields.
pub const I8_NULL: i64 = -128;

/// Null value for unsigned 8-bit fields.
pub const U8_NULL: i64 = 255;

/// Null value for signed 16-bit fields (-3276.8 @ 1dp, -327.68 @ 2dp).
pub const I16_NULL: i64 = -32768;

/// Null value for unsigned 16-bit fields (6553.5 @ 1dp, 655.35 @ 2dp).
pub const U16_NULL: i64 = 65535;

/// Null value for unsigned 32-bit fields.
pub const U32_NULL: i64 = 4_294_967_295;

/// Null value for 3-byte text fields.
pub const TEXT3_NULL: [u8; 3] = [0xFF, 0xFF, 0xFF];

// =============================================================================
// PACKET TYPES
// =============================================================================

/// UDP: request the list of stations the server accepts data for.
pub const PACKET_TYPE_STATION_INFO_REQUEST: u8 = 0x01;

/// UDP: station list response.
pub const PACKET_TYPE_STATION_INFO_RESPONSE: u8 = 0x02;

/// UDP: weather data records.
pub const PACKET_TYPE_WEATHER_DATA_UDP: u8 = 0x03;

/// UDP: sample acknowledgements plus lost live record counter.
pub const PACKET_TYPE_SAMPLE_ACK_UDP: u8 = 0x04;

/// TCP: authenticate the connection.
pub const PACKET_TYPE_AUTHENTICATE: u8 = 0x05;

/// TCP: station, image type and image source lists.
pub const PACKET_TYPE_STATION_INFO_TCP: u8 = 0x06;

/// TCP: weather data records.
pub const PACKET_TYPE_WEATHER_DATA_TCP: u8 = 0x07;

/// TCP: sample acknowledgements.
pub const PACKET_TYPE_SAMPLE_ACK_TCP: u8 = 0x08;

/// TCP: authentication rejected.
pub const PACKET_TYPE_AUTHENTICATE_FAILED: u8 = 0x09;

/// TCP: a single image.
pub const PACKET_TYPE_IMAGE: u8 = 0x10;

/// TCP: image acknowledgements.
pub const PACKET_TYPE_IMAGE_ACK: u8 = 0x11;

// =============================================================================
// RECORD TYPES AND MARKERS
// =============================================================================

/// Live weather record.
pub const RECORD_TYPE_LIVE: u8 = 0x01;

/// Sample weather record.
pub const RECORD_TYPE_SAMPLE: u8 = 0x02;

/// ASCII record separator, terminates records when a packet holds several.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// ASCII end of transmission, terminates UDP record and station lists.
pub const END_OF_TRANSMISSION: u8 = 0x04;

// =============================================================================
// HARDWARE TYPE WIRE IDS
// =============================================================================

/// Generic weather station.
pub const HARDWARE_ID_GENERIC: u8 = 0x01;

/// Fine Offset WH1080 compatible station.
pub const HARDWARE_ID_FOWH1080: u8 = 0x02;

/// Davis Vantage Pro2 / Vue compatible station.
pub const HARDWARE_ID_DAVIS: u8 = 0x03;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum length of a station, image type or image source code.
pub const STATION_CODE_SIZE: usize = 5;

/// Highest station id or hardware type id a station record may carry.
pub const MAX_STATION_RECORD_ID: u8 = 254;

/// Largest TCP weather data packet (the length field is 16 bits).
pub const MAX_TCP_WEATHER_PACKET_SIZE: usize = 65535;

/// Most acknowledgements a single TCP acknowledgement packet can carry.
pub const MAX_TCP_ACKNOWLEDGEMENTS: usize = 255;

// =============================================================================
// CLIENT DEFAULTS
// =============================================================================

/// Compressed live records sent before a full record is forced.
pub const DEFAULT_MAX_COMPRESSED_LIVE_RECORDS: u32 = 30;

/// Sample byte budget per TCP weather data packet.
pub const DEFAULT_TCP_MAX_SAMPLE_PAYLOAD: usize = 60_000;

/// Sample byte budget per UDP datagram, kept below fragmentation size.
pub const DEFAULT_UDP_MAX_SAMPLE_PAYLOAD: usize = 450;

/// How long to wait for a station list before repeating the handshake.
pub const DEFAULT_STATION_LIST_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between TCP reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the client event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;
