//! Dynamically typed field values and closed enum tables.
//!
//! # Responsibility
//! - Carry one field's value between rows, records and statement parameters.
//! - Describe enum types as explicit name/ordinal tables.
//!
//! # Invariants
//! - `FieldValue::Null` is the only representation of an absent value;
//!   extraction never substitutes a zero default.
//! - Enum values bind to statements as their symbolic name.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid decimal regex")
});

/// Bidirectional name/ordinal table for one closed enum type.
///
/// Ordinals are positions in `names`.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumTable {
    pub type_name: &'static str,
    pub names: &'static [&'static str],
}

impl EnumTable {
    pub const fn new(type_name: &'static str, names: &'static [&'static str]) -> Self {
        Self { type_name, names }
    }

    /// Returns the ordinal of the variant with exactly this symbolic name.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| *candidate == name)
    }

    pub fn name_of(&self, ordinal: usize) -> Option<&'static str> {
        self.names.get(ordinal).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Closed enum type usable as a record field.
///
/// Implement this and invoke [`enum_field!`](crate::enum_field) to make the
/// type usable in a record schema.
pub trait SqlEnum: Copy + Send + Sync + 'static {
    const TABLE: &'static EnumTable;

    fn ordinal(self) -> usize;

    fn from_ordinal(ordinal: usize) -> Option<Self>;

    fn name(self) -> &'static str {
        Self::TABLE.name_of(self.ordinal()).unwrap_or_default()
    }
}

/// A resolved enum variant, independent of its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    table: &'static EnumTable,
    ordinal: usize,
}

impl EnumValue {
    pub fn from_ordinal(table: &'static EnumTable, ordinal: usize) -> Option<Self> {
        (ordinal < table.len()).then_some(Self { table, ordinal })
    }

    pub fn from_name(table: &'static EnumTable, name: &str) -> Option<Self> {
        table
            .ordinal_of(name)
            .map(|ordinal| Self { table, ordinal })
    }

    pub fn of<E: SqlEnum>(variant: E) -> Self {
        Self {
            table: E::TABLE,
            ordinal: variant.ordinal(),
        }
    }

    pub fn table(&self) -> &'static EnumTable {
        self.table
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn name(&self) -> &'static str {
        self.table.name_of(self.ordinal).unwrap_or_default()
    }

    /// Converts back into the Rust enum when the tables describe the same type.
    pub fn to_enum<E: SqlEnum>(&self) -> Option<E> {
        if self.table != E::TABLE {
            return None;
        }
        E::from_ordinal(self.ordinal)
    }
}

/// Arbitrary-precision decimal kept in its canonical text form.
///
/// Equality and ordering are numeric: `"10" > "9"` and `"1.50" == "1.5"`,
/// matching how SQLite orders NUMERIC columns.
#[derive(Debug, Clone)]
pub struct Decimal(String);

impl Decimal {
    /// Parses plain or scientific decimal notation.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        DECIMAL_RE
            .is_match(trimmed)
            .then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sign, significant digits without leading or trailing zeros, and the
/// position of the decimal point relative to them (`0.digits * 10^point`).
/// Zero has no digits.
#[derive(Debug, PartialEq, Eq, Hash)]
struct NumericForm<'a> {
    negative: bool,
    digits: std::borrow::Cow<'a, str>,
    point: i64,
}

impl Decimal {
    fn numeric_form(&self) -> NumericForm<'_> {
        let text = self.0.as_str();
        let (negative, unsigned) = match text.as_bytes().first().copied() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(at) => (&unsigned[..at], parse_exponent(&unsigned[at + 1..])),
            None => (unsigned, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        let leading = int_part.len() - int_part.trim_start_matches('0').len();
        let mut point = int_part.len() as i64 - leading as i64;
        let joined = format!("{}{}", &int_part[leading..], frac_part);
        let significant = joined.trim_start_matches('0');
        point -= (joined.len() - significant.len()) as i64;
        let significant = significant.trim_end_matches('0');

        if significant.is_empty() {
            return NumericForm {
                negative: false,
                digits: std::borrow::Cow::Borrowed(""),
                point: 0,
            };
        }
        NumericForm {
            negative,
            digits: std::borrow::Cow::Owned(significant.to_string()),
            point: point.saturating_add(exponent),
        }
    }
}

fn parse_exponent(text: &str) -> i64 {
    text.parse::<i64>().unwrap_or(if text.starts_with('-') {
        i64::MIN / 2
    } else {
        i64::MAX / 2
    })
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.numeric_form() == other.numeric_form()
    }
}

impl Eq for Decimal {}

impl std::hash::Hash for Decimal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.numeric_form().hash(state);
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        let left = self.numeric_form();
        let right = other.numeric_form();
        let magnitude = |form: &NumericForm<'_>| -> Ordering {
            match (form.digits.is_empty(), form.negative) {
                (true, _) => Ordering::Equal,
                (false, true) => Ordering::Less,
                (false, false) => Ordering::Greater,
            }
        };
        match magnitude(&left).cmp(&magnitude(&right)) {
            Ordering::Equal if left.digits.is_empty() => Ordering::Equal,
            Ordering::Equal => {
                let absolute = left
                    .point
                    .cmp(&right.point)
                    .then_with(|| left.digits.cmp(&right.digits));
                if left.negative {
                    absolute.reverse()
                } else {
                    absolute
                }
            }
            unequal => unequal,
        }
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Large character object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Clob(pub String);

/// Large binary object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Blob(pub Vec<u8>);

/// One field value as read from a row or written to a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Clob(String),
    Bytes(Vec<u8>),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Enum(EnumValue),
    /// Store value of a type without a built-in coercion.
    Other(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn from_enum<E: SqlEnum>(variant: E) -> Self {
        Self::Enum(EnumValue::of(variant))
    }

    /// Short variant label used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Clob(_) => "clob",
            Self::Bytes(_) => "bytes",
            Self::Blob(_) => "blob",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::Uuid(_) => "uuid",
            Self::Enum(_) => "enum",
            Self::Other(_) => "other",
        }
    }

    /// Returns the write form: enums become their symbolic name.
    pub fn into_written(self) -> Self {
        match self {
            Self::Enum(value) => Self::Text(value.name().to_string()),
            other => other,
        }
    }

    /// Resolves this value as a variant of `E`, accepting the resolved form
    /// and the written (symbolic name) form.
    pub fn into_enum<E: SqlEnum>(self) -> Result<E, Self> {
        let resolved = match &self {
            Self::Enum(value) => value.to_enum::<E>(),
            Self::Text(name) => E::TABLE.ordinal_of(name).and_then(E::from_ordinal),
            _ => None,
        };
        resolved.ok_or(self)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::I8(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::I16(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::I32(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::I64(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::F32(value) => ToSqlOutput::Owned(Value::Real(f64::from(*value))),
            Self::F64(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Decimal(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_str().as_bytes())),
            Self::Text(value) | Self::Clob(value) => {
                ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes()))
            }
            Self::Bytes(value) | Self::Blob(value) => ToSqlOutput::Borrowed(ValueRef::Blob(value)),
            Self::Date(value) => return value.to_sql(),
            Self::Time(value) => return value.to_sql(),
            Self::Timestamp(value) => return value.to_sql(),
            Self::Uuid(value) => ToSqlOutput::Owned(Value::Text(value.to_string())),
            Self::Enum(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.name().as_bytes())),
            Self::Other(value) => ToSqlOutput::Borrowed(ValueRef::from(value)),
        };
        Ok(output)
    }
}

/// Converts a record field into a [`FieldValue`].
pub trait ToFieldValue {
    fn to_field_value(&self) -> FieldValue;
}

/// Converts a [`FieldValue`] into a record field.
///
/// A rejected value is handed back so the caller can report what it saw.
pub trait FromFieldValue: Sized {
    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue>;
}

macro_rules! field_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToFieldValue for $ty {
                fn to_field_value(&self) -> FieldValue {
                    FieldValue::$variant(self.clone())
                }
            }

            impl FromFieldValue for $ty {
                fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
                    match value {
                        FieldValue::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

field_value_conversions! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    Uuid => Uuid,
}

impl ToFieldValue for Clob {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Clob(self.0.clone())
    }
}

impl FromFieldValue for Clob {
    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
        match value {
            FieldValue::Clob(inner) | FieldValue::Text(inner) => Ok(Self(inner)),
            other => Err(other),
        }
    }
}

impl ToFieldValue for Blob {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Blob(self.0.clone())
    }
}

impl FromFieldValue for Blob {
    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
        match value {
            FieldValue::Blob(inner) | FieldValue::Bytes(inner) => Ok(Self(inner)),
            other => Err(other),
        }
    }
}

impl ToFieldValue for Value {
    fn to_field_value(&self) -> FieldValue {
        match self {
            Value::Null => FieldValue::Null,
            other => FieldValue::Other(other.clone()),
        }
    }
}

impl FromFieldValue for Value {
    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
        match value {
            FieldValue::Other(inner) => Ok(inner),
            other => Err(other),
        }
    }
}

impl<T: ToFieldValue> ToFieldValue for Option<T> {
    fn to_field_value(&self) -> FieldValue {
        self.as_ref()
            .map_or(FieldValue::Null, ToFieldValue::to_field_value)
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_field_value(value).map(Some)
    }
}

/// Makes a [`SqlEnum`] usable as a record field type.
///
/// ```ignore
/// rowmap_core::enum_field!(PublishState);
/// ```
#[macro_export]
macro_rules! enum_field {
    ($ty:ty) => {
        impl $crate::mapping::SqlField for $ty {
            type Base = $ty;
            const KIND: $crate::mapping::FieldKind =
                $crate::mapping::FieldKind::Enum(<$ty as $crate::mapping::SqlEnum>::TABLE);
        }

        impl $crate::mapping::ToFieldValue for $ty {
            fn to_field_value(&self) -> $crate::mapping::FieldValue {
                $crate::mapping::FieldValue::from_enum(*self)
            }
        }

        impl $crate::mapping::FromFieldValue for $ty {
            fn from_field_value(
                value: $crate::mapping::FieldValue,
            ) -> ::std::result::Result<Self, $crate::mapping::FieldValue> {
                value.into_enum::<$ty>()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::{Decimal, EnumTable, EnumValue, FieldValue, SqlEnum};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
    }

    impl SqlEnum for Light {
        const TABLE: &'static EnumTable = &EnumTable::new("Light", &["RED", "GREEN"]);

        fn ordinal(self) -> usize {
            self as usize
        }

        fn from_ordinal(ordinal: usize) -> Option<Self> {
            match ordinal {
                0 => Some(Self::Red),
                1 => Some(Self::Green),
                _ => None,
            }
        }
    }

    #[test]
    fn enum_table_maps_both_directions() {
        assert_eq!(Light::TABLE.ordinal_of("GREEN"), Some(1));
        assert_eq!(Light::TABLE.name_of(0), Some("RED"));
        assert_eq!(Light::TABLE.ordinal_of("green"), None);
        assert_eq!(Light::Green.name(), "GREEN");
    }

    #[test]
    fn enum_value_round_trips_through_written_form() {
        let written = FieldValue::from_enum(Light::Green).into_written();
        assert_eq!(written, FieldValue::Text("GREEN".to_string()));
        assert_eq!(written.into_enum::<Light>(), Ok(Light::Green));
    }

    #[test]
    fn out_of_range_ordinal_is_rejected() {
        assert!(EnumValue::from_ordinal(Light::TABLE, 2).is_none());
        assert!(EnumValue::from_ordinal(Light::TABLE, 1).is_some());
    }

    #[test]
    fn decimal_accepts_plain_and_scientific_notation() {
        assert_eq!(Decimal::parse(" 12.50 ").map(|d| d.to_string()), Some("12.50".to_string()));
        assert!(Decimal::parse("-1e10").is_some());
        assert!(Decimal::parse("12,5").is_none());
        assert!(Decimal::parse("").is_none());
    }

    fn dec(text: &str) -> Decimal {
        Decimal::parse(text).unwrap()
    }

    #[test]
    fn decimal_orders_by_numeric_value() {
        assert!(dec("10") > dec("9"));
        assert!(dec("-10") < dec("-9"));
        assert!(dec("-0.5") < dec("0"));
        assert!(dec("0.125") < dec("0.13"));
        assert!(dec("1e3") > dec("999.9"));
        assert!(dec("12.5E-1") < dec("1.3"));
        assert!(dec(".5") > dec("0.05"));
    }

    #[test]
    fn decimal_equality_ignores_notation() {
        assert_eq!(dec("1.50"), dec("1.5"));
        assert_eq!(dec("+007"), dec("7.000"));
        assert_eq!(dec("1e2"), dec("100"));
        assert_eq!(dec("-0.0"), dec("0"));
        assert_ne!(dec("1.5"), dec("15"));
        assert_eq!(dec("1.50").as_str(), "1.50");
    }
}
