//! Field values carried by weather records.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::ValueError;

/// Calendar date in the range the packed 16-bit wire form can carry
/// (years 2000-2127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    year: u16,
    month: u8,
    day: u8,
}

impl Date {
    /// First representable year.
    pub const MIN_YEAR: u16 = 2000;
    /// Last representable year.
    pub const MAX_YEAR: u16 = 2127;

    /// Validate and construct a date.
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self, ValueError> {
        let valid = (Self::MIN_YEAR..=Self::MAX_YEAR).contains(&year)
            && (1..=12).contains(&month)
            && day >= 1
            && day <= days_in_month(year, month);
        if !valid {
            return Err(ValueError::InvalidDate { year, month, day });
        }
        Ok(Self { year, month, day })
    }

    /// Year.
    pub fn year(&self) -> u16 {
        self.year
    }

    /// Month (1-12).
    pub fn month(&self) -> u8 {
        self.month
    }

    /// Day of month (1-31).
    pub fn day(&self) -> u8 {
        self.day
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Validate and construct a time of day.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValueError> {
        if hour > 23 || minute > 59 {
            return Err(ValueError::InvalidTime { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    /// Hour (0-23).
    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute (0-59).
    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// UTC timestamp in whole seconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Wrap a seconds-since-epoch value.
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Convert a signed UNIX time, rejecting values outside the wire range.
    pub fn try_from_unix(secs: i64) -> Result<Self, ValueError> {
        u32::try_from(secs)
            .map(Self)
            .map_err(|_| ValueError::TimestampOutOfRange)
    }

    /// Seconds since the epoch.
    pub const fn as_secs(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value (counts, ids, raw readings).
    Int(i64),
    /// Measurement with a fractional part.
    Float(f64),
    /// Flag.
    Bool(bool),
    /// Short fixed-width text.
    Text(String),
    /// Calendar date.
    Date(Date),
    /// Time of day.
    Time(TimeOfDay),
    /// Point in time.
    Timestamp(Timestamp),
    /// Nested set of extra sensor fields.
    Subfields(Fields),
}

impl Value {
    /// Short name of the value kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::Subfields(_) => "subfields",
        }
    }

    /// Numeric view of integer and float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from! {
    i64 => Int,
    i32 => Int,
    u16 => Int,
    u8 => Int,
    f64 => Float,
    bool => Bool,
    String => Text,
    &str => Text,
    Date => Date,
    TimeOfDay => Time,
    Timestamp => Timestamp,
    Fields => Subfields,
}

/// Field values of a record, keyed by field name.
///
/// A key mapped to `None` is an explicit null. A key that is absent is
/// treated as null when encoding but is skipped when two records are
/// compared, as there is nothing to compare against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Option<Value>>);

impl Fields {
    /// Empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field to a value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), Some(value.into()));
    }

    /// Set a field to null.
    pub fn set_null(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), None);
    }

    /// Insert a possibly-null value.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style [`set_null`](Self::set_null).
    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.set_null(name);
        self
    }

    /// Entry for a field: `None` if absent, `Some(None)` if null.
    pub fn entry(&self, name: &str) -> Option<&Option<Value>> {
        self.0.get(name)
    }

    /// Value of a field, `None` if absent or null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).and_then(Option::as_ref)
    }

    /// Whether the field is present (possibly null).
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Remove a field.
    pub fn remove(&mut self, name: &str) -> Option<Option<Value>> {
        self.0.remove(name)
    }

    /// Number of present fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no fields are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate present fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Nested subfield set stored under `name`, if any.
    pub fn subfields(&self, name: &str) -> Option<&Fields> {
        match self.get(name) {
            Some(Value::Subfields(f)) => Some(f),
            _ => None,
        }
    }

    /// Mutable nested subfield set stored under `name`, if any.
    pub fn subfields_mut(&mut self, name: &str) -> Option<&mut Fields> {
        match self.0.get_mut(name) {
            Some(Some(Value::Subfields(f))) => Some(f),
            _ => None,
        }
    }
}

impl FromIterator<(String, Option<Value>)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_validation() {
        assert!(Date::new(2015, 9, 13).is_ok());
        assert!(Date::new(2016, 2, 29).is_ok());
        assert!(Date::new(2015, 2, 29).is_err());
        assert!(Date::new(2000, 2, 29).is_ok());
        assert!(Date::new(1999, 1, 1).is_err());
        assert!(Date::new(2128, 1, 1).is_err());
        assert!(Date::new(2015, 0, 1).is_err());
        assert!(Date::new(2015, 4, 31).is_err());
        assert_eq!(Date::new(2015, 9, 13).unwrap().to_string(), "2015-09-13");
    }

    #[test]
    fn test_time_validation() {
        assert!(TimeOfDay::new(0, 0).is_ok());
        assert!(TimeOfDay::new(23, 59).is_ok());
        assert!(TimeOfDay::new(24, 0).is_err());
        assert!(TimeOfDay::new(9, 60).is_err());
        assert_eq!(TimeOfDay::new(9, 5).unwrap().to_string(), "09:05");
    }

    #[test]
    fn test_timestamp_range() {
        assert_eq!(Timestamp::try_from_unix(0).unwrap().as_secs(), 0);
        assert!(Timestamp::try_from_unix(-1).is_err());
        assert!(Timestamp::try_from_unix(u32::MAX as i64 + 1).is_err());
    }

    #[test]
    fn test_fields_absent_vs_null() {
        let fields = Fields::new().with("temperature", 21.5).with_null("humidity");

        assert_eq!(fields.get("temperature"), Some(&Value::Float(21.5)));
        assert_eq!(fields.entry("humidity"), Some(&None));
        assert_eq!(fields.get("humidity"), None);
        assert!(fields.contains("humidity"));
        assert!(!fields.contains("pressure"));
        assert_eq!(fields.entry("pressure"), None);
    }

    #[test]
    fn test_nested_subfields() {
        let extra = Fields::new().with("soil_moisture_1", 40u8);
        let mut fields = Fields::new().with("extra_fields", extra);

        assert_eq!(
            fields.subfields("extra_fields").and_then(|f| f.get("soil_moisture_1")),
            Some(&Value::Int(40))
        );
        if let Some(sub) = fields.subfields_mut("extra_fields") {
            sub.set("soil_moisture_2", 41u8);
        }
        assert_eq!(fields.subfields("extra_fields").map(Fields::len), Some(2));
        assert!(fields.subfields("missing").is_none());
    }
}
