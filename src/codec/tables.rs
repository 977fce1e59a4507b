//! Per-hardware field tables.
//!
//! Field ids 0 and 1 (the diff markers) and 2-10 (shared meteorological
//! fields) are defined identically in every table so a live record can be
//! diffed against a sample record of a different table.

use super::field::{FieldDefinition, FieldMask, FieldSelection, FieldTable, Transform};
use super::primitives::WireType;
use crate::core::{
    HardwareType, LIVE_DIFF_SEQUENCE_FIELD, LIVE_DIFF_SEQUENCE_FIELD_ID,
    SAMPLE_DIFF_TIMESTAMP_FIELD, SAMPLE_DIFF_TIMESTAMP_FIELD_ID,
};

use Transform::{Date, Evapotranspiration, Scaled1dp, Scaled2dp, Timestamp};
use WireType::{Bool, Text3, I16, I8, U16, U32, U8};

/// Field id of the Davis extra sensor subfield set.
pub const EXTRA_FIELDS_ID: u8 = 31;

const fn field(id: u8, name: &'static str, wire: WireType) -> FieldDefinition {
    FieldDefinition::scalar(id, name, wire, Transform::None, true)
}

const fn scaled(id: u8, name: &'static str, wire: WireType, transform: Transform) -> FieldDefinition {
    FieldDefinition::scalar(id, name, wire, transform, true)
}

const fn not_null(id: u8, name: &'static str, wire: WireType, transform: Transform) -> FieldDefinition {
    FieldDefinition::scalar(id, name, wire, transform, false)
}

const LIVE_DIFF_SEQUENCE: FieldDefinition =
    not_null(LIVE_DIFF_SEQUENCE_FIELD_ID, LIVE_DIFF_SEQUENCE_FIELD, U16, Transform::None);
const SAMPLE_DIFF_TIMESTAMP: FieldDefinition =
    not_null(SAMPLE_DIFF_TIMESTAMP_FIELD_ID, SAMPLE_DIFF_TIMESTAMP_FIELD, U32, Timestamp);
const INDOOR_HUMIDITY: FieldDefinition = field(2, "indoor_humidity", U8);
const INDOOR_TEMPERATURE: FieldDefinition = scaled(3, "indoor_temperature", I16, Scaled2dp);
const TEMPERATURE: FieldDefinition = scaled(4, "temperature", I16, Scaled2dp);
const HUMIDITY: FieldDefinition = field(5, "humidity", U8);
const PRESSURE: FieldDefinition = scaled(6, "pressure", U16, Scaled1dp);
const MSL_PRESSURE: FieldDefinition = scaled(7, "msl_pressure", U16, Scaled1dp);
const AVERAGE_WIND_SPEED: FieldDefinition = scaled(8, "average_wind_speed", U16, Scaled1dp);
const GUST_WIND_SPEED: FieldDefinition = scaled(9, "gust_wind_speed", U16, Scaled1dp);
const WIND_DIRECTION: FieldDefinition = field(10, "wind_direction", U16);
const RAINFALL: FieldDefinition = scaled(11, "rainfall", U16, Scaled1dp);

/// Davis extra sensors: leaf, soil and extra temperature/humidity probes.
pub static DAVIS_EXTRA_FIELDS: FieldTable = FieldTable::new(
    "davis extra fields",
    &[
        field(1, "leaf_wetness_1", I8),
        field(2, "leaf_wetness_2", I8),
        scaled(3, "leaf_temperature_1", I16, Scaled1dp),
        scaled(4, "leaf_temperature_2", I16, Scaled1dp),
        field(5, "soil_moisture_1", U8),
        field(6, "soil_moisture_2", U8),
        field(7, "soil_moisture_3", U8),
        field(8, "soil_moisture_4", U8),
        scaled(9, "soil_temperature_1", I16, Scaled1dp),
        scaled(10, "soil_temperature_2", I16, Scaled1dp),
        scaled(11, "soil_temperature_3", I16, Scaled1dp),
        scaled(12, "soil_temperature_4", I16, Scaled1dp),
        scaled(13, "extra_temperature_1", I16, Scaled1dp),
        scaled(14, "extra_temperature_2", I16, Scaled1dp),
        scaled(15, "extra_temperature_3", I16, Scaled1dp),
        field(16, "extra_humidity_1", I8),
        field(17, "extra_humidity_2", I8),
    ],
);

/// Live fields for generic and WH1080 stations.
pub static GENERIC_LIVE_FIELDS: FieldTable = FieldTable::new(
    "generic live",
    &[
        LIVE_DIFF_SEQUENCE,
        SAMPLE_DIFF_TIMESTAMP,
        INDOOR_HUMIDITY,
        INDOOR_TEMPERATURE,
        TEMPERATURE,
        HUMIDITY,
        PRESSURE,
        MSL_PRESSURE,
        AVERAGE_WIND_SPEED,
        GUST_WIND_SPEED,
        WIND_DIRECTION,
    ],
);

/// Live fields for Davis stations.
pub static DAVIS_LIVE_FIELDS: FieldTable = FieldTable::new(
    "davis live",
    &[
        LIVE_DIFF_SEQUENCE,
        SAMPLE_DIFF_TIMESTAMP,
        INDOOR_HUMIDITY,
        INDOOR_TEMPERATURE,
        TEMPERATURE,
        HUMIDITY,
        PRESSURE,
        MSL_PRESSURE,
        AVERAGE_WIND_SPEED,
        GUST_WIND_SPEED,
        WIND_DIRECTION,
        field(12, "bar_trend", I8),
        scaled(13, "rain_rate", U16, Scaled1dp),
        scaled(14, "storm_rain", U16, Scaled1dp),
        scaled(15, "current_storm_start_date", U16, Date),
        field(16, "transmitter_battery", U8),
        scaled(17, "console_battery_voltage", U16, Scaled1dp),
        field(18, "forecast_icon", U8),
        field(19, "forecast_rule_id", U8),
        scaled(20, "uv_index", U8, Scaled1dp),
        field(21, "solar_radiation", U16),
        scaled(22, "average_wind_speed_2m", U16, Scaled1dp),
        scaled(23, "average_wind_speed_10m", U16, Scaled1dp),
        scaled(24, "gust_wind_speed_10m", U16, Scaled1dp),
        field(25, "gust_wind_direction_10m", U16),
        scaled(26, "heat_index", I16, Scaled2dp),
        scaled(27, "thsw_index", I16, Scaled2dp),
        scaled(28, "altimeter_setting", U16, Scaled1dp),
        FieldDefinition::subfields(EXTRA_FIELDS_ID, "extra_fields", &DAVIS_EXTRA_FIELDS),
    ],
);

/// Sample fields for generic stations.
pub static GENERIC_SAMPLE_FIELDS: FieldTable = FieldTable::new(
    "generic sample",
    &[
        SAMPLE_DIFF_TIMESTAMP,
        INDOOR_HUMIDITY,
        INDOOR_TEMPERATURE,
        TEMPERATURE,
        HUMIDITY,
        PRESSURE,
        MSL_PRESSURE,
        AVERAGE_WIND_SPEED,
        GUST_WIND_SPEED,
        WIND_DIRECTION,
        RAINFALL,
    ],
);

/// Sample fields for Fine Offset WH1080 stations.
pub static WH1080_SAMPLE_FIELDS: FieldTable = FieldTable::new(
    "wh1080 sample",
    &[
        SAMPLE_DIFF_TIMESTAMP,
        INDOOR_HUMIDITY,
        INDOOR_TEMPERATURE,
        TEMPERATURE,
        HUMIDITY,
        PRESSURE,
        MSL_PRESSURE,
        AVERAGE_WIND_SPEED,
        GUST_WIND_SPEED,
        WIND_DIRECTION,
        RAINFALL,
        field(12, "sample_interval", U8),
        field(13, "record_number", U16),
        not_null(14, "last_in_batch", Bool, Transform::None),
        not_null(15, "invalid_data", Bool, Transform::None),
        field(16, "wh1080_wind_direction", Text3),
        scaled(17, "total_rain", U32, Scaled1dp),
        not_null(18, "rain_overflow", Bool, Transform::None),
    ],
);

/// Sample fields for Davis stations.
pub static DAVIS_SAMPLE_FIELDS: FieldTable = FieldTable::new(
    "davis sample",
    &[
        SAMPLE_DIFF_TIMESTAMP,
        INDOOR_HUMIDITY,
        INDOOR_TEMPERATURE,
        TEMPERATURE,
        HUMIDITY,
        PRESSURE,
        MSL_PRESSURE,
        AVERAGE_WIND_SPEED,
        GUST_WIND_SPEED,
        WIND_DIRECTION,
        RAINFALL,
        // Raw DMP archive encodings.
        not_null(12, "record_time", U16, Transform::None),
        not_null(13, "record_date", U16, Transform::None),
        scaled(14, "high_temperature", I16, Scaled2dp),
        scaled(15, "low_temperature", I16, Scaled2dp),
        scaled(16, "high_rain_rate", I16, Scaled1dp),
        field(17, "solar_radiation", U16),
        field(18, "wind_sample_count", U8),
        scaled(19, "gust_wind_direction", U16, Scaled1dp),
        scaled(20, "average_uv_index", U8, Scaled1dp),
        // Zero when there was none, never null.
        not_null(21, "evapotranspiration", U8, Evapotranspiration),
        field(22, "high_solar_radiation", U16),
        scaled(23, "high_uv_index", U8, Scaled1dp),
        field(24, "forecast_rule_id", U8),
        FieldDefinition::subfields(EXTRA_FIELDS_ID, "extra_fields", &DAVIS_EXTRA_FIELDS),
    ],
);

/// Live field table for a hardware class.
pub fn live_table(hardware: HardwareType) -> &'static FieldTable {
    match hardware {
        HardwareType::Generic | HardwareType::Fowh1080 => &GENERIC_LIVE_FIELDS,
        HardwareType::Davis => &DAVIS_LIVE_FIELDS,
    }
}

/// Sample field table for a hardware class.
pub fn sample_table(hardware: HardwareType) -> &'static FieldTable {
    match hardware {
        HardwareType::Generic => &GENERIC_SAMPLE_FIELDS,
        HardwareType::Fowh1080 => &WH1080_SAMPLE_FIELDS,
        HardwareType::Davis => &DAVIS_SAMPLE_FIELDS,
    }
}

fn all_extra_fields() -> FieldMask {
    FieldMask::range(1..=17)
}

/// Every data field of a live record (diff markers excluded).
pub fn all_live_fields(hardware: HardwareType) -> FieldSelection {
    match hardware {
        HardwareType::Generic | HardwareType::Fowh1080 => FieldSelection::new(FieldMask::range(2..=10)),
        HardwareType::Davis => FieldSelection::new(
            FieldMask::range(2..=10)
                .union(FieldMask::range(12..=28))
                .with(EXTRA_FIELDS_ID),
        )
        .with_subfields(EXTRA_FIELDS_ID, all_extra_fields()),
    }
}

/// Every data field of a sample record (diff marker excluded).
pub fn all_sample_fields(hardware: HardwareType) -> FieldSelection {
    match hardware {
        HardwareType::Generic => FieldSelection::new(FieldMask::range(2..=11)),
        HardwareType::Fowh1080 => FieldSelection::new(FieldMask::range(2..=18)),
        HardwareType::Davis => {
            FieldSelection::new(FieldMask::range(2..=24).with(EXTRA_FIELDS_ID))
                .with_subfields(EXTRA_FIELDS_ID, all_extra_fields())
        }
    }
}

/// Fields defined with the same id and meaning in both the live and the
/// sample table of a hardware class.
pub fn common_live_sample_fields(hardware: HardwareType) -> FieldSelection {
    match hardware {
        HardwareType::Generic | HardwareType::Fowh1080 => FieldSelection::new(FieldMask::range(1..=10)),
        HardwareType::Davis => FieldSelection::new(FieldMask::range(1..=10).with(EXTRA_FIELDS_ID))
            .with_subfields(EXTRA_FIELDS_ID, all_extra_fields()),
    }
}
