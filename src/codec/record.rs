//! Record codec.
//!
//! Encodes and decodes the field data of a live or sample record given an
//! explicit field selection. Fields are laid out in ascending id order with
//! no padding or separators; the field mask on the wire is the only index.

use std::collections::BTreeMap;

use super::field::{FieldKind, FieldMask, FieldSelection, FieldTable};
use super::value::{Fields, Timestamp, Value};
use crate::core::{DecodeError, EncodeError, StationCode, SUBFIELD_HEADER_SIZE};

/// A near-real-time snapshot of current conditions at a station.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRecord {
    /// Station the record belongs to.
    pub station_code: StationCode,
    /// Field values.
    pub fields: Fields,
}

impl LiveRecord {
    /// Create a live record.
    pub fn new(station_code: StationCode, fields: Fields) -> Self {
        Self { station_code, fields }
    }
}

/// A periodically archived observation, the unit of durable replication.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Station the record belongs to.
    pub station_code: StationCode,
    /// When the sample was taken.
    pub timestamp: Timestamp,
    /// When the sample was downloaded from the station.
    pub download_timestamp: Timestamp,
    /// Field values.
    pub fields: Fields,
}

impl SampleRecord {
    /// Create a sample record.
    pub fn new(
        station_code: StationCode,
        timestamp: Timestamp,
        download_timestamp: Timestamp,
        fields: Fields,
    ) -> Self {
        Self { station_code, timestamp, download_timestamp, fields }
    }
}

/// Encode the selected fields of `fields` using `table`.
///
/// Absent and null values are written as the field's null sentinel.
pub fn encode_fields(
    fields: &Fields,
    table: &FieldTable,
    selection: &FieldSelection,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(calculate_encoded_size(table, selection));
    encode_into(&mut out, fields, table, selection.fields, Some(&selection.subfields))?;
    Ok(out)
}

fn encode_into(
    out: &mut Vec<u8>,
    fields: &Fields,
    table: &FieldTable,
    mask: FieldMask,
    subfields: Option<&BTreeMap<u8, FieldMask>>,
) -> Result<(), EncodeError> {
    for id in mask.ids() {
        let def = table.get(id).ok_or(EncodeError::UnusedField { id })?;
        match def.kind {
            FieldKind::Scalar(scalar) => scalar.encode(def.name, fields.get(def.name), out)?,
            FieldKind::Subfields(sub_table) => {
                let selections =
                    subfields.ok_or(EncodeError::NestedSubfields { field: def.name })?;
                let sub_mask = selections
                    .get(&id)
                    .copied()
                    .ok_or(EncodeError::MissingSubfieldSelection { field: def.name })?;

                let empty = Fields::new();
                let values = match fields.get(def.name) {
                    Some(Value::Subfields(values)) => values,
                    Some(_) => {
                        return Err(EncodeError::TypeMismatch {
                            field: def.name,
                            expected: "subfields",
                        });
                    }
                    None => &empty,
                };

                out.extend_from_slice(&sub_mask.bits().to_be_bytes());
                encode_into(out, values, sub_table, sub_mask, None)?;
            }
        }
    }
    Ok(())
}

/// Decode field data holding the fields in `mask`.
///
/// Sentinel values decode as explicit nulls. Trailing bytes are ignored.
pub fn decode_fields(data: &[u8], table: &FieldTable, mask: FieldMask) -> Result<Fields, DecodeError> {
    let mut offset = 0;
    decode_from(data, &mut offset, table, mask, true)
}

fn decode_from(
    data: &[u8],
    offset: &mut usize,
    table: &FieldTable,
    mask: FieldMask,
    allow_subfields: bool,
) -> Result<Fields, DecodeError> {
    let mut fields = Fields::new();
    for id in mask.ids() {
        let def = table.get(id).ok_or(DecodeError::ReservedField(id))?;
        match def.kind {
            FieldKind::Scalar(scalar) => {
                let bytes = take(data, offset, scalar.wire.size())?;
                fields.insert(def.name, scalar.decode(bytes));
            }
            FieldKind::Subfields(sub_table) => {
                if !allow_subfields {
                    return Err(DecodeError::NestedSubfields(def.name));
                }
                let header = take(data, offset, SUBFIELD_HEADER_SIZE)?;
                let sub_mask =
                    FieldMask::from_bits(u32::from_be_bytes([header[0], header[1], header[2], header[3]]));
                let values = decode_from(data, offset, sub_table, sub_mask, false)?;
                fields.set(def.name, values);
            }
        }
    }
    Ok(fields)
}

fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let end = *offset + len;
    let bytes = data.get(*offset..end).ok_or(DecodeError::Truncated {
        expected: end,
        actual: data.len(),
    })?;
    *offset = end;
    Ok(bytes)
}

/// Bytes needed to encode `selection`. Unused ids count as zero; a subfield
/// set with no subfield selection counts as its header only.
pub fn calculate_encoded_size(table: &FieldTable, selection: &FieldSelection) -> usize {
    mask_size(table, selection.fields, Some(&selection.subfields))
}

fn mask_size(table: &FieldTable, mask: FieldMask, subfields: Option<&BTreeMap<u8, FieldMask>>) -> usize {
    mask.ids()
        .filter_map(|id| table.get(id))
        .map(|def| match def.kind {
            FieldKind::Scalar(scalar) => scalar.wire.size(),
            FieldKind::Subfields(sub_table) => {
                let sub_mask = subfields
                    .and_then(|s| s.get(&def.id))
                    .copied()
                    .unwrap_or_default();
                SUBFIELD_HEADER_SIZE + mask_size(sub_table, sub_mask, None)
            }
        })
        .sum()
}

/// Walk encoded field data reading only subfield headers.
///
/// Returns the subfield masks present, keyed by field id, or `None` if
/// `data` does not yet cover every field in `mask`. Used to work out the
/// exact size of a record whose length is not on the wire.
pub fn find_subfield_ids(
    data: &[u8],
    table: &FieldTable,
    mask: FieldMask,
) -> Result<Option<BTreeMap<u8, FieldMask>>, DecodeError> {
    let mut result = BTreeMap::new();
    let mut offset = 0;

    for id in mask.ids() {
        let def = table.get(id).ok_or(DecodeError::ReservedField(id))?;
        match def.kind {
            FieldKind::Scalar(scalar) => offset += scalar.wire.size(),
            FieldKind::Subfields(sub_table) => {
                let Some(header) = data.get(offset..offset + SUBFIELD_HEADER_SIZE) else {
                    return Ok(None);
                };
                let sub_mask =
                    FieldMask::from_bits(u32::from_be_bytes([header[0], header[1], header[2], header[3]]));
                offset += SUBFIELD_HEADER_SIZE + mask_size(sub_table, sub_mask, None);
                result.insert(id, sub_mask);
            }
        }
        if offset > data.len() {
            return Ok(None);
        }
    }
    Ok(Some(result))
}

/// Full selection (top-level mask plus subfield masks) of encoded data.
pub fn selection_of(
    data: &[u8],
    table: &FieldTable,
    mask: FieldMask,
) -> Result<Option<FieldSelection>, DecodeError> {
    Ok(find_subfield_ids(data, table, mask)?.map(|subfields| FieldSelection { fields: mask, subfields }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{
        all_live_fields, all_sample_fields, decode_evapotranspiration, decode_scaled, live_table,
        sample_table, Date, ScalarField, TimeOfDay, Transform, WireType, EXTRA_FIELDS_ID,
    };
    use crate::core::HardwareType;
    use proptest::prelude::*;

    fn sample_fields() -> Fields {
        Fields::new()
            .with("indoor_humidity", 45u8)
            .with("indoor_temperature", 21.34)
            .with("temperature", -3.5)
            .with("humidity", 88u8)
            .with("pressure", 1013.2)
            .with("msl_pressure", 1020.1)
            .with("average_wind_speed", 3.4)
            .with("gust_wind_speed", 7.9)
            .with("wind_direction", 270u16)
            .with("rainfall", 0.3)
    }

    fn davis_live_fields() -> Fields {
        let extra = Fields::new()
            .with("leaf_wetness_1", 3u8)
            .with("soil_moisture_1", 40u8)
            .with("soil_temperature_2", 12.5)
            .with("extra_humidity_2", 55u8);
        sample_fields()
            .with("bar_trend", -20)
            .with("rain_rate", 1.2)
            .with_null("storm_rain")
            .with("current_storm_start_date", Date::new(2015, 9, 13).unwrap())
            .with("transmitter_battery", 0u8)
            .with("console_battery_voltage", 4.7)
            .with("forecast_icon", 6u8)
            .with("forecast_rule_id", 45u8)
            .with("uv_index", 2.5)
            .with("solar_radiation", 680u16)
            .with("average_wind_speed_2m", 3.1)
            .with("average_wind_speed_10m", 2.9)
            .with("gust_wind_speed_10m", 9.8)
            .with("gust_wind_direction_10m", 225u16)
            .with("heat_index", -2.11)
            .with("thsw_index", 1.0)
            .with("altimeter_setting", 1019.6)
            .with("extra_fields", extra)
    }

    #[test]
    fn test_generic_sample_round_trip() {
        let hw = HardwareType::Generic;
        let fields = sample_fields();
        let selection = all_sample_fields(hw);
        let encoded = encode_fields(&fields, sample_table(hw), &selection).unwrap();

        assert_eq!(encoded.len(), calculate_encoded_size(sample_table(hw), &selection));
        let decoded = decode_fields(&encoded, sample_table(hw), selection.fields).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_davis_live_round_trip_with_subfields() {
        let hw = HardwareType::Davis;
        let fields = davis_live_fields();
        let selection = all_live_fields(hw);
        let table = live_table(hw);
        let encoded = encode_fields(&fields, table, &selection).unwrap();
        assert_eq!(encoded.len(), 75);

        let decoded = decode_fields(&encoded, table, selection.fields).unwrap();
        for name in ["bar_trend", "current_storm_start_date", "heat_index", "altimeter_setting"] {
            assert_eq!(decoded.get(name), fields.get(name), "{name}");
        }
        assert_eq!(decoded.entry("storm_rain"), Some(&None));

        let extra = decoded.subfields("extra_fields").unwrap();
        assert_eq!(extra.len(), 17);
        assert_eq!(extra.get("soil_moisture_1"), Some(&Value::Int(40)));
        assert_eq!(extra.get("soil_temperature_2"), Some(&Value::Float(12.5)));
        assert_eq!(extra.entry("soil_moisture_2"), Some(&None));
    }

    #[test]
    fn test_absent_field_decodes_as_null() {
        let hw = HardwareType::Generic;
        let fields = Fields::new().with("temperature", 12.0);
        let selection = FieldSelection::new(FieldMask::range(4..=5));
        let encoded = encode_fields(&fields, live_table(hw), &selection).unwrap();
        assert_eq!(encoded, [0x04, 0xB0, 0xFF]);

        let decoded = decode_fields(&encoded, live_table(hw), selection.fields).unwrap();
        assert_eq!(decoded.entry("humidity"), Some(&None));
    }

    #[test]
    fn test_encode_invariant_violations() {
        let table = live_table(HardwareType::Generic);

        let fields = Fields::new().with("humidity", 255u8);
        assert!(matches!(
            encode_fields(&fields, table, &FieldSelection::new(FieldMask::EMPTY.with(5))),
            Err(EncodeError::NullCollision { field: "humidity", value: 255 })
        ));

        assert!(matches!(
            encode_fields(&Fields::new(), table, &FieldSelection::new(FieldMask::EMPTY.with(0))),
            Err(EncodeError::MissingValue { field: "live_diff_sequence" })
        ));

        assert!(matches!(
            encode_fields(&Fields::new(), table, &FieldSelection::new(FieldMask::EMPTY.with(11))),
            Err(EncodeError::UnusedField { id: 11 })
        ));

        let davis = live_table(HardwareType::Davis);
        assert!(matches!(
            encode_fields(&Fields::new(), davis, &FieldSelection::new(FieldMask::EMPTY.with(31))),
            Err(EncodeError::MissingSubfieldSelection { field: "extra_fields" })
        ));
    }

    #[test]
    fn test_decode_errors() {
        let table = live_table(HardwareType::Generic);
        assert_eq!(
            decode_fields(&[0x01], table, FieldMask::EMPTY.with(4)),
            Err(DecodeError::Truncated { expected: 2, actual: 1 })
        );
        assert_eq!(
            decode_fields(&[0x01], table, FieldMask::EMPTY.with(12)),
            Err(DecodeError::ReservedField(12))
        );
    }

    #[test]
    fn test_davis_sample_raw_fields() {
        let hw = HardwareType::Davis;
        let fields = sample_fields()
            .with("record_time", 950u16)
            .with("record_date", 7981u16)
            .with("evapotranspiration", 0.254)
            .with("extra_fields", Fields::new());
        let selection = FieldSelection::new(FieldMask::from_iter([12, 13, 21, EXTRA_FIELDS_ID]))
            .with_subfields(EXTRA_FIELDS_ID, FieldMask::EMPTY);
        let encoded = encode_fields(&fields, sample_table(hw), &selection).unwrap();
        assert_eq!(encoded, [0x03, 0xB6, 0x1F, 0x2D, 10, 0, 0, 0, 0]);

        let decoded = decode_fields(&encoded, sample_table(hw), selection.fields).unwrap();
        assert_eq!(decoded.get("record_time"), Some(&Value::Int(950)));
        assert_eq!(decoded.subfields("extra_fields"), Some(&Fields::new()));
    }

    #[test]
    fn test_find_subfield_ids() {
        let hw = HardwareType::Davis;
        let table = live_table(hw);
        let fields = davis_live_fields();
        let subs = FieldMask::from_iter([1, 5, 10]);
        let selection = FieldSelection::new(FieldMask::from_iter([2, EXTRA_FIELDS_ID]))
            .with_subfields(EXTRA_FIELDS_ID, subs);
        let encoded = encode_fields(&fields, table, &selection).unwrap();
        assert_eq!(encoded.len(), 1 + 4 + 1 + 1 + 2);

        let found = find_subfield_ids(&encoded, table, selection.fields).unwrap().unwrap();
        assert_eq!(found.get(&EXTRA_FIELDS_ID), Some(&subs));

        // Header not yet available.
        assert_eq!(find_subfield_ids(&encoded[..3], table, selection.fields), Ok(None));
        // Header available but the subfields are not.
        assert_eq!(find_subfield_ids(&encoded[..6], table, selection.fields), Ok(None));

        let full = selection_of(&encoded, table, selection.fields).unwrap().unwrap();
        assert_eq!(full, selection);
    }

    #[derive(Debug, Clone)]
    enum Drawn {
        Scalar(Option<Value>),
        Subfields(FieldMask, Fields),
    }

    fn raw_value(wire: WireType, null: Option<i64>) -> BoxedStrategy<i64> {
        let (lo, hi) = match wire {
            WireType::I8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
            WireType::U8 => (0, i64::from(u8::MAX)),
            WireType::I16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
            WireType::U16 => (0, i64::from(u16::MAX)),
            WireType::U32 => (0, i64::from(u32::MAX)),
            WireType::Bool => (0, 1),
            WireType::Text3 => unreachable!("text has no integer form"),
        };
        (lo..=hi)
            .prop_filter("null sentinel", move |raw| Some(*raw) != null)
            .boxed()
    }

    fn scalar_value(field: ScalarField) -> BoxedStrategy<Option<Value>> {
        let null = field.null_sentinel();
        let value = match (field.transform, field.wire) {
            (_, WireType::Text3) => "[A-Z]{0,3}".prop_map(Value::Text).boxed(),
            (Transform::None, WireType::Bool) => any::<bool>().prop_map(Value::Bool).boxed(),
            (Transform::None, wire) => raw_value(wire, null).prop_map(Value::Int).boxed(),
            (Transform::Scaled1dp, wire) => raw_value(wire, null)
                .prop_map(|raw| Value::Float(decode_scaled(raw, 10)))
                .boxed(),
            (Transform::Scaled2dp, wire) => raw_value(wire, null)
                .prop_map(|raw| Value::Float(decode_scaled(raw, 100)))
                .boxed(),
            (Transform::Evapotranspiration, wire) => raw_value(wire, null)
                .prop_map(|raw| Value::Float(decode_evapotranspiration(raw)))
                .boxed(),
            (Transform::Date, _) => (Date::MIN_YEAR..=Date::MAX_YEAR, 1u8..=12, 1u8..=28)
                .prop_map(|(y, m, d)| Value::Date(Date::new(y, m, d).unwrap()))
                .boxed(),
            (Transform::Time, _) => (0u8..24, 0u8..60)
                .prop_map(|(h, m)| Value::Time(TimeOfDay::new(h, m).unwrap()))
                .boxed(),
            (Transform::Timestamp, wire) => raw_value(wire, null)
                .prop_map(|raw| Value::Timestamp(Timestamp::from_secs(raw as u32)))
                .boxed(),
        };
        if field.nullable {
            prop::option::of(value).boxed()
        } else {
            value.prop_map(Some).boxed()
        }
    }

    /// A random subset of `table`'s fields, each with a value or null.
    fn drawn_fields(table: &'static FieldTable) -> BoxedStrategy<Vec<(bool, u8, &'static str, Drawn)>> {
        let parts: Vec<_> = table
            .definitions()
            .map(|def| {
                let (id, name) = (def.id, def.name);
                let value = match def.kind {
                    FieldKind::Scalar(field) => scalar_value(field).prop_map(Drawn::Scalar).boxed(),
                    FieldKind::Subfields(subtable) => drawn_fields(subtable)
                        .prop_map(|parts| {
                            let mut mask = FieldMask::EMPTY;
                            let mut fields = Fields::new();
                            for (selected, id, name, drawn) in parts {
                                if let (true, Drawn::Scalar(value)) = (selected, drawn) {
                                    mask = mask.with(id);
                                    fields.insert(name, value);
                                }
                            }
                            Drawn::Subfields(mask, fields)
                        })
                        .boxed(),
                };
                (any::<bool>(), value)
                    .prop_map(move |(selected, drawn)| (selected, id, name, drawn))
                    .boxed()
            })
            .collect();
        parts.boxed()
    }

    fn record_case(table: &'static FieldTable) -> BoxedStrategy<(FieldSelection, Fields)> {
        drawn_fields(table)
            .prop_map(|parts| {
                let mut selection = FieldSelection::default();
                let mut fields = Fields::new();
                for (selected, id, name, drawn) in parts.into_iter().filter(|part| part.0) {
                    selection.fields = selection.fields.with(id);
                    match drawn {
                        Drawn::Scalar(value) => fields.insert(name, value),
                        Drawn::Subfields(mask, subfields) => {
                            selection.subfields.insert(id, mask);
                            fields.set(name, subfields);
                        }
                    }
                }
                (selection, fields)
            })
            .boxed()
    }

    fn any_table() -> impl Strategy<Value = &'static FieldTable> {
        let tables: Vec<&'static FieldTable> = HardwareType::ALL
            .iter()
            .flat_map(|&hw| [live_table(hw), sample_table(hw)])
            .collect();
        prop::sample::select(tables)
    }

    proptest! {
        #[test]
        fn prop_record_round_trip(
            (table, (selection, fields)) in any_table()
                .prop_flat_map(|table| record_case(table).prop_map(move |case| (table, case)))
        ) {
            let encoded = encode_fields(&fields, table, &selection).unwrap();
            prop_assert_eq!(encoded.len(), calculate_encoded_size(table, &selection));

            let decoded = decode_fields(&encoded, table, selection.fields).unwrap();
            prop_assert_eq!(decoded, fields);
            prop_assert_eq!(
                selection_of(&encoded, table, selection.fields).unwrap(),
                Some(selection)
            );
        }
    }
}
