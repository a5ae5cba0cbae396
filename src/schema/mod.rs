//! # Record Schema
//!
//! The reflection layer of the engine: record identity, indexable field
//! values, timestamp stamping and the optional change hooks. Everything
//! the storage and query layers know about a record type flows through
//! the [`Record`] trait.

mod errors;

pub use errors::{SchemaError, SchemaResult};

use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::database::Database;
use crate::errors::Result;

/// Number of random bytes assigned to a fresh id.
pub const ID_LEN: usize = 24;

/// Record identifier: a variable-length byte string.
///
/// Serializes as a URL-safe base64 string. Two records are identical iff
/// they share type name and id bytes.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(Vec<u8>);

impl Id {
    /// A fresh id of [`ID_LEN`] random bytes.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; ID_LEN];
        rand::thread_rng().fill(&mut bytes[..]);
        Id(bytes)
    }

    /// Wrap raw bytes as an id.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Id(bytes.into())
    }

    /// Decode the textual (base64) representation of an id.
    pub fn decode(text: &str) -> SchemaResult<Self> {
        URL_SAFE
            .decode(text)
            .map(Id)
            .map_err(|err| SchemaError::InvalidId(err.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// An empty id marks a record that has never been stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE.encode(&self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl From<Vec<u8>> for Id {
    fn from(bytes: Vec<u8>) -> Self {
        Id(bytes)
    }
}

impl From<&[u8]> for Id {
    fn from(bytes: &[u8]) -> Self {
        Id(bytes.to_vec())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Id::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// A value an indexed field can hold.
///
/// The encoding doubles as the index leaf path segment and as the
/// equality domain for query predicates: two field values are equal iff
/// their encodings are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl IndexValue {
    /// Byte encoding used in index paths.
    ///
    /// String → raw bytes; integer → big-endian fixed width; boolean →
    /// one byte; byte string → itself. An empty encoding is replaced by
    /// a single zero byte so the path segment is never empty.
    pub fn encode(&self) -> Vec<u8> {
        let bytes = match self {
            IndexValue::Str(s) => s.as_bytes().to_vec(),
            IndexValue::Int(i) => i.to_be_bytes().to_vec(),
            IndexValue::Bool(b) => vec![u8::from(*b)],
            IndexValue::Bytes(b) => b.clone(),
        };
        if bytes.is_empty() {
            vec![0]
        } else {
            bytes
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Str(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Str(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<i32> for IndexValue {
    fn from(value: i32) -> Self {
        IndexValue::Int(value.into())
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        IndexValue::Bool(value)
    }
}

impl From<Vec<u8>> for IndexValue {
    fn from(value: Vec<u8>) -> Self {
        IndexValue::Bytes(value)
    }
}

impl From<&Id> for IndexValue {
    fn from(value: &Id) -> Self {
        IndexValue::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Id> for IndexValue {
    fn from(value: Id) -> Self {
        IndexValue::Bytes(value.0)
    }
}

/// One indexed field: name and current value.
pub type IndexedField = (&'static str, IndexValue);

/// A storable record.
///
/// Implementors provide identity, the indexed field list, and optional
/// timestamp stamping. The `created`/`updated`/`deleted` hooks run after
/// commit, before subscriber dispatch; a hook error surfaces to the
/// transaction caller without undoing the commit. Hooks may open new
/// transactions on the database they receive and may chain further
/// events through [`Database::emit_update`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable name that namespaces all storage for this record shape.
    const TYPE_NAME: &'static str;

    fn id(&self) -> &Id;

    fn id_mut(&mut self) -> &mut Id;

    /// The indexed fields of this record, in declaration order.
    fn indexed_fields(&self) -> Vec<IndexedField> {
        Vec::new()
    }

    /// Creation timestamp, when the record tracks one.
    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Store the creation timestamp. Called once on insert, and on
    /// update to carry the stored value forward.
    fn stamp_created(&mut self, _at: DateTime<Utc>) {}

    /// Store the modification timestamp. Called on every successful set.
    fn stamp_updated(&mut self, _at: DateTime<Utc>) {}

    /// Hook: the record was inserted.
    fn created(&self, _db: &Database) -> Result<()> {
        Ok(())
    }

    /// Hook: the record was updated; `old` is the pre-image.
    fn updated(&self, _db: &Database, _old: &Self) -> Result<()> {
        Ok(())
    }

    /// Hook: the record was deleted.
    fn deleted(&self, _db: &Database) -> Result<()> {
        Ok(())
    }
}

/// Look up the current value of an indexed field by name.
pub(crate) fn indexed_value<T: Record>(record: &T, field: &str) -> SchemaResult<IndexValue> {
    record
        .indexed_fields()
        .into_iter()
        .find(|(name, _)| *name == field)
        .map(|(_, value)| value)
        .ok_or_else(|| SchemaError::UnknownField {
            type_name: T::TYPE_NAME,
            field: field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_id_length_and_uniqueness() {
        let a = Id::random();
        let b = Id::random();
        assert_eq!(a.as_bytes().len(), ID_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_text_roundtrip() {
        let id = Id::from_bytes(vec![0, 1, 2, 250, 251, 252]);
        let decoded = Id::decode(&id.to_string()).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn test_id_serde_roundtrip() {
        let id = Id::random();
        let json = serde_json::to_string(&id).unwrap();
        let back: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_id_decode_rejects_garbage() {
        assert!(Id::decode("not base64 at all!").is_err());
    }

    #[test]
    fn test_encode_string_and_bytes_raw() {
        assert_eq!(IndexValue::from("hehu").encode(), b"hehu".to_vec());
        assert_eq!(IndexValue::from(vec![1u8, 2, 3]).encode(), vec![1, 2, 3]);
    }

    #[test]
    fn test_encode_int_big_endian() {
        assert_eq!(IndexValue::from(1i64).encode(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        let twelve = IndexValue::from(12i64).encode();
        let thirteen = IndexValue::from(13i64).encode();
        assert!(twelve < thirteen);
        assert_eq!(twelve.len(), 8);
    }

    #[test]
    fn test_encode_bool_distinct() {
        assert_eq!(IndexValue::from(false).encode(), vec![0]);
        assert_eq!(IndexValue::from(true).encode(), vec![1]);
    }

    #[test]
    fn test_encode_empty_substitutes_zero() {
        assert_eq!(IndexValue::from("").encode(), vec![0]);
        assert_eq!(IndexValue::from(Vec::<u8>::new()).encode(), vec![0]);
    }

    #[test]
    fn test_string_encoding_order_preserving() {
        let a = IndexValue::from("alpha").encode();
        let b = IndexValue::from("beta").encode();
        assert!(a < b);
    }
}
