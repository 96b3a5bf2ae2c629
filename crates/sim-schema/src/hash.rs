//! Content-addressed hashing of blackboard values
//!
//! Provides [`ValueHash`], a strongly-typed 32-byte Blake3 hash of a JSON
//! value's canonical encoding. Audit records carry these as before/after
//! hashes of every mutation.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde_json::Value;

/// A 32-byte content hash (Blake3)
///
/// Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueHash([u8; 32]);

impl ValueHash {
    /// Create a new hash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Compute Blake3 hash of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Hash a JSON value.
    ///
    /// `serde_json` maps are ordered, so equal values always encode to the
    /// same bytes.
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        // Serializing a `Value` into memory cannot fail.
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        Self::compute(&bytes)
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ValueHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ValueHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for ValueHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ValueHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl schemars::JsonSchema for ValueHash {
    fn schema_name() -> String {
        "ValueHash".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// Errors that can occur when working with value hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_hash_is_deterministic() {
        let a = json!({"b": 1, "a": [1, 2, 3]});
        let b = json!({"a": [1, 2, 3], "b": 1});
        assert_eq!(ValueHash::of_value(&a), ValueHash::of_value(&b));
    }

    #[test]
    fn value_hash_differs_for_different_values() {
        assert_ne!(
            ValueHash::of_value(&json!("one")),
            ValueHash::of_value(&json!("two"))
        );
    }

    #[test]
    fn value_hash_from_slice_invalid_length() {
        let result = ValueHash::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(HashError::InvalidLength {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn value_hash_display_and_parse() {
        let hash = ValueHash::compute(b"test");
        let parsed: ValueHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn value_hash_serde_json() {
        let hash = ValueHash::compute(b"test");
        let encoded = serde_json::to_string(&hash).unwrap();
        let decoded: ValueHash = serde_json::from_str(&encoded).unwrap();
        assert_eq!(hash, decoded);
    }
}
