//! Canonical JSON encoding for hashing and signing.
//!
//! Transaction IDs, signing payloads, and block header hashes must be
//! identical across runs and platforms regardless of source field order.
//! The canonical form is compact JSON with object keys sorted
//! lexicographically and absent optional fields omitted.
//!
//! `serde_json::Value` objects are backed by a `BTreeMap`, so routing any
//! `Serialize` type through a `Value` yields sorted keys for free.

use serde::Serialize;
use serde_json::Value;

use crate::error::TransactionError;

/// Serialize a value to its canonical JSON byte form.
///
/// Keys are sorted lexicographically at every nesting level; there is no
/// whitespace. Returns `Serialization` if the value cannot be represented
/// as JSON.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, TransactionError> {
    let v = serde_json::to_value(value)
        .map_err(|e| TransactionError::Serialization(e.to_string()))?;
    serde_json::to_vec(&v).map_err(|e| TransactionError::Serialization(e.to_string()))
}

/// Like [`to_canonical_bytes`], but with a caller-applied edit on the
/// intermediate [`Value`] (used to strip `id` or signature fields before
/// hashing).
pub fn to_canonical_bytes_with<T, F>(value: &T, edit: F) -> Result<Vec<u8>, TransactionError>
where
    T: Serialize,
    F: FnOnce(&mut Value),
{
    let mut v = serde_json::to_value(value)
        .map_err(|e| TransactionError::Serialization(e.to_string()))?;
    edit(&mut v);
    serde_json::to_vec(&v).map_err(|e| TransactionError::Serialization(e.to_string()))
}
