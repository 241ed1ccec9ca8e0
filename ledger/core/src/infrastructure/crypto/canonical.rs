// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Canonical Encoding
//!
//! Deterministic byte encoding of structured records, used as the exact input
//! to signing and verification. The encoding is compact JSON with object keys
//! sorted lexicographically (by UTF-8 bytes) at every depth; array order is
//! preserved. Two records with the same field set produce identical bytes
//! regardless of the order in which their fields were built.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("record is not serializable: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Canonical bytes of any serializable record.
pub fn canonicalize<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(record)?;
    Ok(canonicalize_value(&value))
}

pub fn canonicalize_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    write_canonical(value, &mut out);
    out
}

/// Canonical bytes of `value` with the given top-level fields removed.
///
/// Used to exclude a record's own `signature` from its signing input.
pub fn canonicalize_without(value: &Value, excluded: &[&str]) -> Vec<u8> {
    match value {
        Value::Object(map) => {
            let filtered: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !excluded.contains(&key.as_str()))
                .map(|(key, v)| (key.clone(), v.clone()))
                .collect();
            canonicalize_value(&Value::Object(filtered))
        }
        other => canonicalize_value(other),
    }
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Display on a JSON string value yields the escaped, quoted form
                out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(item, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}
