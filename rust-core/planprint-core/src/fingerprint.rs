// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan fingerprints.
//!
//! A canonical tree is serialized as compact JSON with every mapping's keys in
//! lexicographic order, then hashed with SHA-256. Attribute insertion order
//! never reaches the digest; sibling order always does.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::canonical::CanonicalTree;
use crate::error::{PlanError, PlanResult};

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of a canonical plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for compact display.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(PlanError::invalid_field(
                "fingerprint",
                format!("expected {FINGERPRINT_LEN} lowercase hex characters, got {s:?}"),
            ));
        }
        Ok(Fingerprint(s.to_string()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = PlanError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Canonical byte encoding of a tree: compact JSON, keys sorted at every level.
pub fn canonical_bytes(tree: &CanonicalTree) -> PlanResult<Vec<u8>> {
    Ok(serde_json::to_vec(&sort_keys(&tree.to_value()))?)
}

/// Fingerprint a canonical tree.
pub fn fingerprint(tree: &CanonicalTree) -> PlanResult<Fingerprint> {
    let bytes = canonical_bytes(tree)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let fp = Fingerprint(hex::encode(hasher.finalize()));

    trace!(bytes = bytes.len(), fingerprint = %fp.short(), "fingerprinted canonical plan");
    Ok(fp)
}

/// Exact equality of two fingerprints.
pub fn plans_match(a: &Fingerprint, b: &Fingerprint) -> bool {
    a.as_str() == b.as_str()
}

// Maps keep insertion order, so rebuilding them in sorted order is enough for
// the serializer to emit sorted keys. Arrays are left untouched.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
