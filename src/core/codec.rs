// Copyright (c) 2026 Data Mesher
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Canonical document codec.
//!
//! The signature surface must be reproducible bit-for-bit across peers, so
//! every entity encodes to a [`Document`] first: a restricted JSON value
//! whose maps are `BTreeMap`s (keys emitted sorted by their UTF-8 bytes) and
//! whose numbers are unsigned integers. Decoding rejects floats, negative
//! numbers, nulls and duplicate map keys outright; anything that survives
//! re-encodes to the exact bytes the sender signed.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Structural decode error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not a well-formed canonical document.
    #[error("malformed document")]
    Malformed,
    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A field is present with the wrong type.
    #[error("wrong type for `{0}`")]
    WrongType(&'static str),
    /// A field decodes but its value is out of range or invalid.
    #[error("invalid value for `{0}`")]
    InvalidValue(&'static str),
}

/// Canonical map type.
pub type Map = BTreeMap<String, Document>;

/// A restricted JSON value with a single canonical byte encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Document {
    /// Boolean.
    Bool(bool),
    /// Non-negative integer (timestamps, ports).
    Int(u64),
    /// UTF-8 string.
    Str(String),
    /// Ordered list.
    List(Vec<Document>),
    /// Mapping with unique keys, emitted in lexicographic key order.
    Map(Map),
}

impl Document {
    /// Canonical byte encoding. Identical semantic content yields identical
    /// bytes; these are the bytes that get signed and verified.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Compact output over BTreeMaps is deterministic; Document contains
        // nothing serde_json can fail on.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse a transport payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|_| CodecError::Malformed)
    }

    /// View as a map or fail structurally.
    pub fn as_map(&self, field: &'static str) -> Result<&Map, CodecError> {
        match self {
            Document::Map(m) => Ok(m),
            _ => Err(CodecError::WrongType(field)),
        }
    }
}

impl From<bool> for Document {
    fn from(v: bool) -> Self {
        Document::Bool(v)
    }
}
impl From<u64> for Document {
    fn from(v: u64) -> Self {
        Document::Int(v)
    }
}
impl From<&str> for Document {
    fn from(v: &str) -> Self {
        Document::Str(v.to_string())
    }
}
impl From<String> for Document {
    fn from(v: String) -> Self {
        Document::Str(v)
    }
}
impl From<Vec<Document>> for Document {
    fn from(v: Vec<Document>) -> Self {
        Document::List(v)
    }
}
impl From<Map> for Document {
    fn from(v: Map) -> Self {
        Document::Map(v)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Document::Bool(v) => s.serialize_bool(*v),
            Document::Int(v) => s.serialize_u64(*v),
            Document::Str(v) => s.serialize_str(v),
            Document::List(v) => v.serialize(s),
            Document::Map(v) => v.serialize(s),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct DocVisitor;

        impl<'de> Visitor<'de> for DocVisitor {
            type Value = Document;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a canonical document value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Document, E> {
                Ok(Document::Bool(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Document, E> {
                Ok(Document::Int(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Document, E> {
                u64::try_from(v)
                    .map(Document::Int)
                    .map_err(|_| E::custom("negative integer"))
            }

            fn visit_f64<E: de::Error>(self, _v: f64) -> Result<Document, E> {
                Err(E::custom("non-integer number"))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Document, E> {
                Err(E::custom("null is not canonical"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Document, E> {
                Ok(Document::Str(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Document, E> {
                Ok(Document::Str(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Document, A::Error> {
                let mut out = Vec::new();
                while let Some(item) = seq.next_element::<Document>()? {
                    out.push(item);
                }
                Ok(Document::List(out))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Document, A::Error> {
                let mut out = Map::new();
                while let Some((key, value)) = map.next_entry::<String, Document>()? {
                    if out.insert(key.clone(), value).is_some() {
                        return Err(de::Error::custom(format!("duplicate key `{key}`")));
                    }
                }
                Ok(Document::Map(out))
            }
        }

        d.deserialize_any(DocVisitor)
    }
}

/// Required string field.
pub fn str_field<'a>(map: &'a Map, field: &'static str) -> Result<&'a str, CodecError> {
    match map.get(field) {
        Some(Document::Str(v)) => Ok(v),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Required integer field.
pub fn u64_field(map: &Map, field: &'static str) -> Result<u64, CodecError> {
    match map.get(field) {
        Some(Document::Int(v)) => Ok(*v),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Required boolean field.
pub fn bool_field(map: &Map, field: &'static str) -> Result<bool, CodecError> {
    match map.get(field) {
        Some(Document::Bool(v)) => Ok(*v),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Required list field.
pub fn list_field<'a>(map: &'a Map, field: &'static str) -> Result<&'a [Document], CodecError> {
    match map.get(field) {
        Some(Document::List(v)) => Ok(v),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Required map field.
pub fn map_field<'a>(map: &'a Map, field: &'static str) -> Result<&'a Map, CodecError> {
    match map.get(field) {
        Some(Document::Map(v)) => Ok(v),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Optional integer field.
pub fn opt_u64_field(map: &Map, field: &'static str) -> Result<Option<u64>, CodecError> {
    match map.get(field) {
        Some(Document::Int(v)) => Ok(Some(*v)),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Ok(None),
    }
}

/// Optional string field.
pub fn opt_str_field<'a>(
    map: &'a Map,
    field: &'static str,
) -> Result<Option<&'a str>, CodecError> {
    match map.get(field) {
        Some(Document::Str(v)) => Ok(Some(v)),
        Some(_) => Err(CodecError::WrongType(field)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_bytes_sort_map_keys() {
        let mut a = Map::new();
        a.insert("port".into(), 7331u64.into());
        a.insert("ip".into(), "42::1".into());
        let mut b = Map::new();
        b.insert("ip".into(), "42::1".into());
        b.insert("port".into(), 7331u64.into());

        let da = Document::from(a);
        let db = Document::from(b);
        assert_eq!(da.to_bytes(), db.to_bytes());
        assert_eq!(da.to_bytes(), br#"{"ip":"42::1","port":7331}"#.to_vec());
    }

    #[test]
    fn decode_rejects_duplicate_keys() {
        assert!(Document::from_slice(br#"{"a":1,"a":2}"#).is_err());
        assert!(Document::from_slice(br#"{"x":{"a":1,"a":2}}"#).is_err());
    }

    #[test]
    fn decode_rejects_non_canonical_numbers() {
        assert!(Document::from_slice(b"1.5").is_err());
        assert!(Document::from_slice(b"-3").is_err());
        assert!(Document::from_slice(b"null").is_err());
        assert!(matches!(
            Document::from_slice(b"17"),
            Ok(Document::Int(17))
        ));
    }

    #[test]
    fn decode_round_trips() {
        let raw = br#"{"hosts":{},"settings":{"public":true,"tld":"m"}}"#;
        let doc = Document::from_slice(raw).unwrap();
        assert_eq!(doc.to_bytes(), raw.to_vec());
    }
}
