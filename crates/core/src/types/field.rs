//! Typed field values as the hosted document store represents them.
//!
//! Documents are read and written through the store's REST surface, where
//! every value is wrapped in a one-key object naming its type:
//!
//! ```json
//! { "stringValue": "a@x.com" }
//! { "integerValue": "42" }
//! { "mapValue": { "fields": { "city": { "stringValue": "Lyon" } } } }
//! ```
//!
//! Modelling that shape directly keeps opaque profile and shipment fields
//! byte-for-byte stable when a record is copied to a new key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level fields of a document, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(#[serde(with = "int64_string")] i64),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    /// Base64-encoded bytes.
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Array payload. The store omits `values` for an empty array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FieldValue>,
}

/// Map payload. The store omits `fields` for an empty map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: Fields,
}

impl FieldValue {
    /// Shorthand for a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::StringValue(s.into())
    }

    /// The contained string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::StringValue(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::StringValue(s)
    }
}

/// Shallow overlay of `incoming` onto `target`.
///
/// Every top-level field of `target` survives unless `incoming` supplies a
/// value for the same name, in which case the incoming value wins. Nested
/// maps are replaced whole, not merged.
#[must_use]
pub fn overlay_fields(target: &Fields, incoming: &Fields) -> Fields {
    let mut merged = target.clone();
    for (name, value) in incoming {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// 64-bit integers travel as decimal strings; accept bare numbers too.
mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(D::Error::custom),
            Raw::Number(n) => Ok(n),
        }
    }
}
