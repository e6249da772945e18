// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Canonical Encoding
//!
//! Deterministic JSON encoding and content hashing shared by every component
//! that derives a key from a structured value.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Single source of truth for procedural pattern keys,
//!   reinforcement state/action keys and detected-pattern dedup keys

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Encode `value` as compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a string Value yields the escaped JSON literal
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of the canonical encoding.
pub fn content_hash(value: &Value) -> String {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    hex::encode(digest)
}

/// Build a namespaced key such as `state:buy` or `action:<hash>`.
///
/// Plain strings are used verbatim so human-readable states stay readable in
/// dumps of the Q-table; every other value is hashed.
pub fn canonical_key(namespace: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("{}:{}", namespace, s),
        other => format!("{}:{}", namespace, content_hash(other)),
    }
}
