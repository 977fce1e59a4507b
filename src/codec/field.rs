//! Field definitions, field tables and field-id bitmasks.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use super::primitives::{
    decode_date, decode_evapotranspiration, decode_scaled, decode_text3, decode_time,
    encode_date, encode_evapotranspiration, encode_scaled, encode_text3, encode_time, WireType,
};
use super::value::{Timestamp, Value};
use crate::core::{EncodeError, FIELD_SLOT_COUNT, MAX_FIELD_ID, TEXT3_NULL};

/// Conversion applied between a field value and its wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Value is stored as-is.
    None,
    /// Float rounded to one decimal place, stored times 10.
    Scaled1dp,
    /// Float rounded to two decimal places, stored times 100.
    Scaled2dp,
    /// Millimetres stored as thousandths of an inch.
    Evapotranspiration,
    /// Packed calendar date.
    Date,
    /// Packed time of day.
    Time,
    /// Seconds since the epoch.
    Timestamp,
}

impl Transform {
    fn expected_kind(self) -> &'static str {
        match self {
            Self::None => "integer",
            Self::Scaled1dp | Self::Scaled2dp | Self::Evapotranspiration => "numeric",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
        }
    }
}

/// A fixed-width scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarField {
    /// Wire encoding.
    pub wire: WireType,
    /// Value transform.
    pub transform: Transform,
    /// Whether absent values are encoded with the wire type's null sentinel.
    pub nullable: bool,
}

impl ScalarField {
    /// The reserved null value, if the field is nullable.
    pub fn null_sentinel(&self) -> Option<i64> {
        if self.nullable { self.wire.null_sentinel() } else { None }
    }

    /// Append the encoded form of `value` (absent meaning null).
    pub fn encode(
        &self,
        field: &'static str,
        value: Option<&Value>,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        if self.wire == WireType::Text3 {
            return self.encode_text(field, value, out);
        }

        let Some(value) = value else {
            let null = self
                .null_sentinel()
                .ok_or(EncodeError::MissingValue { field })?;
            self.wire.write_int(null, out);
            return Ok(());
        };

        let raw = self.to_raw(field, value)?;
        if !self.wire.in_range(raw) {
            return Err(EncodeError::OutOfRange { field, value: raw });
        }
        if self.null_sentinel() == Some(raw) {
            return Err(EncodeError::NullCollision { field, value: raw });
        }
        self.wire.write_int(raw, out);
        Ok(())
    }

    fn encode_text(
        &self,
        field: &'static str,
        value: Option<&Value>,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let text = match value {
            None if !self.nullable => return Err(EncodeError::MissingValue { field }),
            None => None,
            Some(Value::Text(s)) => Some(s.as_str()),
            Some(_) => {
                return Err(EncodeError::TypeMismatch { field, expected: "text" });
            }
        };
        let bytes = encode_text3(text).ok_or(EncodeError::TextTooLong { field, max: 3 })?;
        if text.is_some() && bytes == TEXT3_NULL {
            return Err(EncodeError::NullCollision { field, value: 0xFF_FFFF });
        }
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn to_raw(&self, field: &'static str, value: &Value) -> Result<i64, EncodeError> {
        let mismatch = || EncodeError::TypeMismatch {
            field,
            expected: self.transform.expected_kind(),
        };
        let numeric = |value: &Value| -> Result<f64, EncodeError> {
            let v = value.as_f64().ok_or_else(mismatch)?;
            if v.is_finite() { Ok(v) } else { Err(EncodeError::NonFinite { field }) }
        };

        match (self.transform, value) {
            (Transform::None, Value::Bool(b)) if self.wire == WireType::Bool => Ok(*b as i64),
            (Transform::None, Value::Int(i)) if self.wire != WireType::Bool => Ok(*i),
            (Transform::Scaled1dp, v) => numeric(v).map(|v| encode_scaled(v, 10)),
            (Transform::Scaled2dp, v) => numeric(v).map(|v| encode_scaled(v, 100)),
            (Transform::Evapotranspiration, v) => numeric(v).map(encode_evapotranspiration),
            (Transform::Date, Value::Date(d)) => Ok(encode_date(Some(*d)) as i64),
            (Transform::Time, Value::Time(t)) => Ok(encode_time(Some(*t)) as i64),
            (Transform::Timestamp, Value::Timestamp(t)) => Ok(t.as_secs() as i64),
            _ if self.wire == WireType::Bool => Err(EncodeError::TypeMismatch { field, expected: "boolean" }),
            _ => Err(mismatch()),
        }
    }

    /// Decode from the first [`WireType::size`] bytes of `data`. The null
    /// sentinel decodes as `None`.
    pub fn decode(&self, data: &[u8]) -> Option<Value> {
        if self.wire == WireType::Text3 {
            let text = decode_text3([data[0], data[1], data[2]])?;
            return Some(Value::Text(text));
        }

        let raw = self.wire.read_int(data);
        if self.null_sentinel() == Some(raw) {
            return None;
        }
        match self.transform {
            Transform::None if self.wire == WireType::Bool => Some(Value::Bool(raw != 0)),
            Transform::None => Some(Value::Int(raw)),
            Transform::Scaled1dp => Some(Value::Float(decode_scaled(raw, 10))),
            Transform::Scaled2dp => Some(Value::Float(decode_scaled(raw, 100))),
            Transform::Evapotranspiration => Some(Value::Float(decode_evapotranspiration(raw))),
            Transform::Date => decode_date(raw as u16).map(Value::Date),
            Transform::Time => decode_time(raw as u16).map(Value::Time),
            Transform::Timestamp => Some(Value::Timestamp(Timestamp::from_secs(raw as u32))),
        }
    }
}

/// What a field holds on the wire.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// A single fixed-width value.
    Scalar(ScalarField),
    /// A subfield bitmask followed by the selected subfields.
    Subfields(&'static FieldTable),
}

/// One entry of a field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldDefinition {
    /// Field id (0-31), also its bit in the field mask.
    pub id: u8,
    /// Field name, the key in a record's [`Fields`](super::Fields).
    pub name: &'static str,
    /// Wire representation.
    pub kind: FieldKind,
}

impl FieldDefinition {
    /// Define a scalar field.
    pub const fn scalar(
        id: u8,
        name: &'static str,
        wire: WireType,
        transform: Transform,
        nullable: bool,
    ) -> Self {
        Self {
            id,
            name,
            kind: FieldKind::Scalar(ScalarField { wire, transform, nullable }),
        }
    }

    /// Define a subfield set.
    pub const fn subfields(id: u8, name: &'static str, table: &'static FieldTable) -> Self {
        Self { id, name, kind: FieldKind::Subfields(table) }
    }

    /// Whether this field is a subfield set.
    pub fn is_subfield_set(&self) -> bool {
        matches!(self.kind, FieldKind::Subfields(_))
    }
}

/// A slot in a field table.
#[derive(Debug, Clone, Copy)]
pub enum FieldSlot {
    /// Reserved or not used by this hardware class.
    Unused,
    /// A defined field.
    Defined(FieldDefinition),
}

/// The 32 field slots of one record type for one hardware class.
#[derive(Debug)]
pub struct FieldTable {
    name: &'static str,
    slots: [FieldSlot; FIELD_SLOT_COUNT],
}

impl FieldTable {
    /// Build a table, placing each definition in the slot of its id.
    ///
    /// Panics (at compile time for `static` tables) on an id above 31 or a
    /// duplicate id.
    pub const fn new(name: &'static str, definitions: &[FieldDefinition]) -> Self {
        let mut slots = [FieldSlot::Unused; FIELD_SLOT_COUNT];
        let mut i = 0;
        while i < definitions.len() {
            let def = definitions[i];
            assert!(def.id <= MAX_FIELD_ID, "field id out of range");
            assert!(matches!(slots[def.id as usize], FieldSlot::Unused), "duplicate field id");
            slots[def.id as usize] = FieldSlot::Defined(def);
            i += 1;
        }
        Self { name, slots }
    }

    /// Table name, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Definition for a field id. O(1).
    pub fn get(&self, id: u8) -> Option<&FieldDefinition> {
        match self.slots.get(id as usize) {
            Some(FieldSlot::Defined(def)) => Some(def),
            _ => None,
        }
    }

    /// Definition for a field name.
    pub fn by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.definitions().find(|def| def.name == name)
    }

    /// Defined fields in ascending id order.
    pub fn definitions(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.slots.iter().filter_map(|slot| match slot {
            FieldSlot::Defined(def) => Some(def),
            FieldSlot::Unused => None,
        })
    }

    /// Mask of every defined id.
    pub fn defined_ids(&self) -> FieldMask {
        self.definitions().map(|def| def.id).collect()
    }
}

/// A 32-bit field-id bitmask: bit *n* set iff field *n* is present.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldMask(u32);

impl FieldMask {
    /// No fields.
    pub const EMPTY: FieldMask = FieldMask(0);

    /// Wrap raw mask bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw mask bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Mask with every id in `range` set.
    pub fn range(range: RangeInclusive<u8>) -> Self {
        range.collect()
    }

    /// Whether `id` is set.
    pub fn contains(self, id: u8) -> bool {
        id <= MAX_FIELD_ID && self.0 & (1 << id) != 0
    }

    /// Set `id`. Ids above 31 are ignored.
    pub fn insert(&mut self, id: u8) {
        if id <= MAX_FIELD_ID {
            self.0 |= 1 << id;
        }
    }

    /// Clear `id`.
    pub fn remove(&mut self, id: u8) {
        if id <= MAX_FIELD_ID {
            self.0 &= !(1 << id);
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, id: u8) -> Self {
        self.insert(id);
        self
    }

    /// Union of two masks.
    pub fn union(self, other: FieldMask) -> Self {
        Self(self.0 | other.0)
    }

    /// Ids set in `self` but not in `other`.
    pub fn difference(self, other: FieldMask) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether no ids are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of ids set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Set ids in ascending order.
    pub fn ids(self) -> impl Iterator<Item = u8> {
        (0..=MAX_FIELD_ID).filter(move |&id| self.contains(id))
    }
}

impl FromIterator<u8> for FieldMask {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}

impl fmt::Debug for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ids()).finish()
    }
}

/// A set of field ids plus, for each selected subfield set, its subfield ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    /// Top-level field ids.
    pub fields: FieldMask,
    /// Subfield ids keyed by the id of their subfield-set field.
    pub subfields: BTreeMap<u8, FieldMask>,
}

impl FieldSelection {
    /// Selection of top-level fields only.
    pub fn new(fields: FieldMask) -> Self {
        Self { fields, subfields: BTreeMap::new() }
    }

    /// Builder-style subfield selection for subfield-set field `id`.
    pub fn with_subfields(mut self, id: u8, subfields: FieldMask) -> Self {
        self.subfields.insert(id, subfields);
        self
    }

    /// Subfields selected for field `id` (empty if none).
    pub fn subfield_mask(&self, id: u8) -> FieldMask {
        self.subfields.get(&id).copied().unwrap_or_default()
    }

    /// Whether no top-level field is selected.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
