//! Fixed-width primitive codecs.
//!
//! All integers are big-endian. Each wire type has a reserved null bit
//! pattern which nullable fields use to encode an absent value.

use super::value::{Date, TimeOfDay, Timestamp};
use crate::core::{I8_NULL, I16_NULL, TEXT3_NULL, U8_NULL, U16_NULL, U32_NULL};

/// Wire types a scalar field can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Signed byte.
    I8,
    /// Unsigned byte.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Boolean byte (0 or 1). Has no null sentinel.
    Bool,
    /// Three bytes of NUL padded text.
    Text3,
}

impl WireType {
    /// Encoded width in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::Text3 => 3,
            Self::U32 => 4,
        }
    }

    /// Reserved null value of an integer wire type.
    pub const fn null_sentinel(self) -> Option<i64> {
        match self {
            Self::I8 => Some(I8_NULL),
            Self::U8 => Some(U8_NULL),
            Self::I16 => Some(I16_NULL),
            Self::U16 => Some(U16_NULL),
            Self::U32 => Some(U32_NULL),
            Self::Bool | Self::Text3 => None,
        }
    }

    /// Whether `value` fits the integer range of this wire type.
    pub fn in_range(self, value: i64) -> bool {
        let (min, max) = match self {
            Self::I8 => (i8::MIN as i64, i8::MAX as i64),
            Self::U8 => (0, u8::MAX as i64),
            Self::I16 => (i16::MIN as i64, i16::MAX as i64),
            Self::U16 => (0, u16::MAX as i64),
            Self::U32 => (0, u32::MAX as i64),
            Self::Bool => (0, 1),
            Self::Text3 => return false,
        };
        (min..=max).contains(&value)
    }

    /// Append an integer in this wire type. The caller checks the range.
    pub fn write_int(self, value: i64, out: &mut Vec<u8>) {
        match self {
            Self::I8 => out.push(value as i8 as u8),
            Self::U8 | Self::Bool => out.push(value as u8),
            Self::I16 => out.extend_from_slice(&(value as i16).to_be_bytes()),
            Self::U16 => out.extend_from_slice(&(value as u16).to_be_bytes()),
            Self::U32 => out.extend_from_slice(&(value as u32).to_be_bytes()),
            Self::Text3 => out.extend_from_slice(&TEXT3_NULL),
        }
    }

    /// Read an integer in this wire type. `data` must hold at least
    /// [`size`](Self::size) bytes.
    pub fn read_int(self, data: &[u8]) -> i64 {
        match self {
            Self::I8 => data[0] as i8 as i64,
            Self::U8 | Self::Bool => data[0] as i64,
            Self::I16 => i16::from_be_bytes([data[0], data[1]]) as i64,
            Self::U16 => u16::from_be_bytes([data[0], data[1]]) as i64,
            Self::U32 => u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64,
            Self::Text3 => 0,
        }
    }
}

/// Encode a timestamp as seconds since the epoch.
pub fn encode_timestamp(ts: Timestamp) -> u32 {
    ts.as_secs()
}

/// Decode seconds since the epoch.
pub fn decode_timestamp(value: u32) -> Timestamp {
    Timestamp::from_secs(value)
}

/// Pack a date into 16 bits: year offset from 2000 (7 bits), month (4
/// bits), day (5 bits). `None` encodes as `0xFFFF`.
pub fn encode_date(date: Option<Date>) -> u16 {
    match date {
        Some(d) => ((d.year() - Date::MIN_YEAR) << 9) | ((d.month() as u16) << 5) | d.day() as u16,
        None => U16_NULL as u16,
    }
}

/// Unpack a date. Zero, `0xFFFF` and invalid calendar dates decode as `None`.
pub fn decode_date(value: u16) -> Option<Date> {
    if value == 0 || value == U16_NULL as u16 {
        return None;
    }
    let year = Date::MIN_YEAR + ((value & 0xFE00) >> 9);
    let month = ((value & 0x01E0) >> 5) as u8;
    let day = (value & 0x001F) as u8;
    Date::new(year, month, day).ok()
}

/// Encode a time of day as `hour * 100 + minute`. `None` encodes as `0xFFFF`.
pub fn encode_time(time: Option<TimeOfDay>) -> u16 {
    match time {
        Some(t) => t.hour() as u16 * 100 + t.minute() as u16,
        None => U16_NULL as u16,
    }
}

/// Decode a time of day. `0xFFFF` and out of range values decode as `None`.
pub fn decode_time(value: u16) -> Option<TimeOfDay> {
    if value == U16_NULL as u16 {
        return None;
    }
    TimeOfDay::new((value / 100) as u8, (value % 100) as u8).ok()
}

/// Encode a float as a fixed-point integer with `scale` steps per unit.
pub fn encode_scaled(value: f64, scale: u32) -> i64 {
    (value * scale as f64).round() as i64
}

/// Decode a fixed-point integer with `scale` steps per unit.
pub fn decode_scaled(value: i64, scale: u32) -> f64 {
    value as f64 / scale as f64
}

/// Encode evapotranspiration in millimetres as thousandths of an inch.
pub fn encode_evapotranspiration(mm: f64) -> i64 {
    (mm / 25.4 * 1000.0).round() as i64
}

/// Decode evapotranspiration from thousandths of an inch to millimetres.
pub fn decode_evapotranspiration(value: i64) -> f64 {
    (value as f64 / 1000.0) * 25.4
}

/// Encode three bytes of text, NUL padded. `None` encodes as `FF FF FF`.
///
/// Returns `None` when the text does not fit.
pub fn encode_text3(text: Option<&str>) -> Option<[u8; 3]> {
    let Some(text) = text else {
        return Some(TEXT3_NULL);
    };
    let bytes = text.as_bytes();
    if bytes.len() > 3 {
        return None;
    }
    let mut out = [0u8; 3];
    out[..bytes.len()].copy_from_slice(bytes);
    Some(out)
}

/// Decode three bytes of text. `FF FF FF` decodes as `None`.
pub fn decode_text3(data: [u8; 3]) -> Option<String> {
    if data == TEXT3_NULL {
        return None;
    }
    let end = data.iter().position(|&b| b == 0).unwrap_or(3);
    Some(String::from_utf8_lossy(&data[..end]).into_owned())
}
