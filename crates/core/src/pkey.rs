// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primary-key values: a scalar or an ordered tuple, serialized on the wire
//! as a bare scalar when single-valued and as a JSON array otherwise.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An object's primary-key value. `objpkey` on the wire is a scalar for
/// single-attribute primary keys and an array for tuple primary keys; this
/// type normalizes both into an ordered vector so cache arenas can key on it
/// uniformly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct PKey(Vec<OrdValue>);

impl PKey {
    pub fn single(v: impl Into<Value>) -> Self {
        PKey(vec![OrdValue(v.into())])
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        PKey(values.into_iter().map(OrdValue).collect())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|v| &v.0)
    }

    pub fn as_slice(&self) -> &[OrdValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            write!(f, "{}", self.0[0].0)
        } else {
            write!(f, "(")?;
            for (i, v) in self.0.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", v.0)?;
            }
            write!(f, ")")
        }
    }
}

impl TryFrom<Value> for PKey {
    type Error = std::convert::Infallible;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Array(items) => PKey(items.into_iter().map(OrdValue).collect()),
            other => PKey(vec![OrdValue(other)]),
        })
    }
}

impl From<PKey> for Value {
    fn from(pkey: PKey) -> Self {
        let mut items: Vec<Value> = pkey.0.into_iter().map(|v| v.0).collect();
        if items.len() == 1 {
            items.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(items)
        }
    }
}

/// `serde_json::Value` doesn't implement `Ord`/`Hash`; primary keys need
/// both to serve as arena map keys, and the wire contract guarantees they
/// only ever carry scalar (string/number/bool/null) leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdValue(pub Value);

impl PartialEq for OrdValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for OrdValue {}

impl PartialOrd for OrdValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        canonical_string(&self.0).cmp(&canonical_string(&other.0))
    }
}

impl std::hash::Hash for OrdValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        canonical_string(&self.0).hash(state);
    }
}

fn canonical_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "pkey_tests.rs"]
mod tests;
