//! Hardware classes and station codes.

use std::fmt;
use std::str::FromStr;

use super::constants::{
    HARDWARE_ID_DAVIS, HARDWARE_ID_FOWH1080, HARDWARE_ID_GENERIC, STATION_CODE_SIZE,
};
use super::error::ValueError;

/// Supported weather-station product families.
///
/// Each class has its own field tables and a wire id that is distinct from
/// any identifier the origin database uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HardwareType {
    /// Generic station (no hardware specific fields).
    Generic = HARDWARE_ID_GENERIC,
    /// Fine Offset WH1080 and compatibles.
    Fowh1080 = HARDWARE_ID_FOWH1080,
    /// Davis Vantage Pro2 / Vue and compatibles.
    Davis = HARDWARE_ID_DAVIS,
}

impl HardwareType {
    /// All hardware classes in wire id order.
    pub const ALL: [HardwareType; 3] = [Self::Generic, Self::Fowh1080, Self::Davis];

    /// Parse from the wire id.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            HARDWARE_ID_GENERIC => Some(Self::Generic),
            HARDWARE_ID_FOWH1080 => Some(Self::Fowh1080),
            HARDWARE_ID_DAVIS => Some(Self::Davis),
            _ => None,
        }
    }

    /// Convert to the wire id.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Textual hardware type code as used by the origin database.
    pub fn code(self) -> &'static str {
        match self {
            Self::Generic => "GENERIC",
            Self::Fowh1080 => "FOWH1080",
            Self::Davis => "DAVIS",
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for HardwareType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|hw| hw.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValueError::UnknownHardwareTypeCode(s.to_string()))
    }
}

impl TryFrom<u8> for HardwareType {
    type Error = ValueError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        Self::from_byte(b).ok_or(ValueError::UnknownHardwareTypeId(b))
    }
}

/// A station code: up to five bytes, NUL padded on the wire.
///
/// The same fixed-width code format is used for image type and image source
/// codes in TCP station info packets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationCode(String);

impl StationCode {
    /// Validate and wrap a code.
    pub fn new(code: impl Into<String>) -> Result<Self, ValueError> {
        let code = code.into();
        if code.is_empty() || code.len() > STATION_CODE_SIZE || code.contains('\0') {
            return Err(ValueError::InvalidStationCode(code));
        }
        Ok(Self(code))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire form, NUL padded to five bytes.
    pub fn to_bytes(&self) -> [u8; STATION_CODE_SIZE] {
        let mut out = [0u8; STATION_CODE_SIZE];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }

    /// Parse the wire form, stripping trailing NUL padding.
    pub fn from_bytes(data: &[u8; STATION_CODE_SIZE]) -> Result<Self, ValueError> {
        let end = data.iter().position(|&b| b == 0).unwrap_or(STATION_CODE_SIZE);
        let code = std::str::from_utf8(&data[..end])
            .map_err(|_| ValueError::InvalidStationCode(String::from_utf8_lossy(data).into_owned()))?;
        Self::new(code)
    }
}

impl fmt::Display for StationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StationCode {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for StationCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
