//! Error types for the weather-push protocol.

use thiserror::Error;

/// Errors raised while encoding a record.
///
/// Every variant indicates a data-contract bug upstream of the encoder. None
/// of them are expected in normal operation and they must not be tolerated
/// silently, as the record would otherwise corrupt the wire stream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    /// The encoded value equals the field's reserved null sentinel.
    #[error("value {value} for field {field} collides with its null sentinel")]
    NullCollision {
        /// Field name.
        field: &'static str,
        /// Raw encoded value.
        value: i64,
    },

    /// Field has no null sentinel but the record holds no value for it.
    #[error("attempted to encode null value for not-null field {field}")]
    MissingValue {
        /// Field name.
        field: &'static str,
    },

    /// Value is of the wrong kind for the field.
    #[error("field {field} expects {expected} value")]
    TypeMismatch {
        /// Field name.
        field: &'static str,
        /// Expected value kind.
        expected: &'static str,
    },

    /// Encoded value does not fit in the field's wire type.
    #[error("value {value} out of range for field {field}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Raw encoded value.
        value: i64,
    },

    /// Float value is NaN or infinite.
    #[error("non-finite value for field {field}")]
    NonFinite {
        /// Field name.
        field: &'static str,
    },

    /// Fixed-width text does not fit.
    #[error("text for field {field} exceeds {max} bytes")]
    TextTooLong {
        /// Field name.
        field: &'static str,
        /// Maximum length in bytes.
        max: usize,
    },

    /// A subfield set was found inside another subfield set.
    #[error("subfield set {field} nested within a subfield set")]
    NestedSubfields {
        /// Field name.
        field: &'static str,
    },

    /// Selection includes a field id the table leaves unused.
    #[error("unused field id {id} selected for encoding")]
    UnusedField {
        /// Field id.
        id: u8,
    },

    /// No subfield selection was supplied for a selected subfield set.
    #[error("no subfield selection for subfield set {field}")]
    MissingSubfieldSelection {
        /// Field name.
        field: &'static str,
    },
}

/// Errors raised while decoding record field data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Field data ended before all selected fields were read.
    #[error("field data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Mask selects a reserved or unused field id.
    #[error("reserved field {0} included in field mask")]
    ReservedField(u8),

    /// A subfield set was found inside another subfield set.
    #[error("subfield set {0} nested within a subfield set")]
    NestedSubfields(&'static str),
}

/// Range violations rejected at constructor boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Station code is empty, too long or contains NUL.
    #[error("invalid station code {0:?}: must be 1-5 bytes without NUL")]
    InvalidStationCode(String),

    /// Station id outside 0-254.
    #[error("station id {0} out of range (0-254)")]
    StationIdOutOfRange(u8),

    /// Hardware type id is not one of the known wire ids.
    #[error("unknown hardware type id {0}")]
    UnknownHardwareTypeId(u8),

    /// Hardware type code is not one of the known codes.
    #[error("unknown hardware type code {0:?}")]
    UnknownHardwareTypeCode(String),

    /// Too many acknowledgements for one packet.
    #[error("acknowledgement packet full ({max} records)")]
    TooManyAcknowledgements {
        /// Maximum record count.
        max: usize,
    },

    /// Calendar date cannot be represented.
    #[error("invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate {
        /// Year.
        year: u16,
        /// Month.
        month: u8,
        /// Day of month.
        day: u8,
    },

    /// Time of day cannot be represented.
    #[error("invalid time {hour:02}:{minute:02}")]
    InvalidTime {
        /// Hour.
        hour: u8,
        /// Minute.
        minute: u8,
    },

    /// Time lies outside the 32-bit UNIX timestamp range.
    #[error("timestamp outside the 32-bit epoch range")]
    TimestampOutOfRange,
}

/// Top-level weather-push errors.
#[derive(Debug, Error)]
pub enum WeatherPushError {
    /// Encoding error.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Range violation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Packet framing error.
    #[cfg(feature = "transport")]
    #[error("packet error: {0}")]
    Packet(#[from] crate::transport::PacketError),

    /// Client error.
    #[cfg(feature = "client")]
    #[error("client error: {0}")]
    Client(#[from] crate::client::ClientError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_messages() {
        let err = EncodeError::NullCollision {
            field: "humidity",
            value: 255,
        };
        assert_eq!(
            err.to_string(),
            "value 255 for field humidity collides with its null sentinel"
        );

        let err = EncodeError::MissingValue {
            field: "record_time",
        };
        assert!(err.to_string().contains("record_time"));
    }

    #[test]
    fn test_value_error_messages() {
        let err = ValueError::InvalidDate {
            year: 2015,
            month: 13,
            day: 1,
        };
        assert_eq!(err.to_string(), "invalid date 2015-13-01");
        assert_eq!(
            ValueError::StationIdOutOfRange(255).to_string(),
            "station id 255 out of range (0-254)"
        );
    }

    #[test]
    fn test_top_level_conversion() {
        let err: WeatherPushError = DecodeError::ReservedField(11).into();
        assert!(matches!(err, WeatherPushError::Decode(DecodeError::ReservedField(11))));
    }
}
