// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus event wire format and the in-memory [`Event`] record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pkey::PKey;

/// If a string attribute is logged and its length exceeds this, it is
/// truncated and tagged as a long string instead of printed in full.
pub const LONG_STRING_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Base,
    Initsync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Added,
    Modified,
    Removed,
    InitStart,
    InitStop,
    Dataschema,
}

impl EventType {
    pub fn is_terminal(self) -> bool {
        matches!(self, EventType::Removed)
    }
}

/// The `objattrs` payload, whose shape depends on `eventtype`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedAttrs {
    #[serde(default)]
    pub added: IndexMap<String, Value>,
    #[serde(default)]
    pub modified: IndexMap<String, Value>,
    /// Removed attribute names map to `null` on the wire.
    #[serde(default)]
    pub removed: IndexMap<String, Value>,
}

impl ModifiedAttrs {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// An immutable bus-delivered record describing one object-type change, or
/// (for `init-start`/`init-stop`/`dataschema`) a control/schema event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub evcategory: EventCategory,
    pub eventtype: EventType,
    pub objtype: Option<String>,
    pub objpkey: Option<PKey>,
    pub objattrs: Value,
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub is_partially_processed: bool,
    #[serde(skip)]
    pub offset: Option<u64>,
    #[serde(skip, default = "default_timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn default_timestamp() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

impl Event {
    pub fn added(
        objtype: impl Into<String>,
        objpkey: PKey,
        attrs: IndexMap<String, Value>,
        category: EventCategory,
    ) -> Self {
        Self {
            evcategory: category,
            eventtype: EventType::Added,
            objtype: Some(objtype.into()),
            objpkey: Some(objpkey),
            objattrs: serde_json::to_value(attrs).unwrap_or(Value::Object(Default::default())),
            step: 0,
            is_partially_processed: false,
            offset: None,
            timestamp: default_timestamp(),
        }
    }

    pub fn modified(
        objtype: impl Into<String>,
        objpkey: PKey,
        diff: ModifiedAttrs,
        category: EventCategory,
    ) -> Self {
        Self {
            evcategory: category,
            eventtype: EventType::Modified,
            objtype: Some(objtype.into()),
            objpkey: Some(objpkey),
            objattrs: serde_json::to_value(diff).unwrap_or(Value::Object(Default::default())),
            step: 0,
            is_partially_processed: false,
            offset: None,
            timestamp: default_timestamp(),
        }
    }

    pub fn removed(objtype: impl Into<String>, objpkey: PKey, category: EventCategory) -> Self {
        Self {
            evcategory: category,
            eventtype: EventType::Removed,
            objtype: Some(objtype.into()),
            objpkey: Some(objpkey),
            objattrs: Value::Object(Default::default()),
            step: 0,
            is_partially_processed: false,
            offset: None,
            timestamp: default_timestamp(),
        }
    }

    pub fn modified_attrs(&self) -> Option<ModifiedAttrs> {
        if self.eventtype != EventType::Modified {
            return None;
        }
        serde_json::from_value(self.objattrs.clone()).ok()
    }

    pub fn added_attrs(&self) -> Option<IndexMap<String, Value>> {
        if self.eventtype != EventType::Added {
            return None;
        }
        serde_json::from_value(self.objattrs.clone()).ok()
    }

    /// A printable representation with secret attributes redacted and long
    /// strings truncated, mirroring `Event.toString` in the original.
    pub fn to_display_string(&self, secret_attrs: &HashSet<String>) -> String {
        let category = match self.evcategory {
            EventCategory::Base => String::new(),
            EventCategory::Initsync => "initsync_".to_string(),
        };
        let redacted = redact_value(&self.objattrs, secret_attrs);
        match (&self.objtype, &self.objpkey) {
            (Some(t), Some(p)) => {
                format!("<Event({category}{t}_{:?}[{p}], {redacted})>", self.eventtype)
            }
            _ => format!("<Event({category}{:?}, {redacted})>", self.eventtype),
        }
    }
}

pub(crate) fn redact_attrs(attrs: &IndexMap<String, Value>, secret_attrs: &HashSet<String>) -> Value {
    let mut out = serde_json::Map::new();
    for (k, v) in attrs {
        out.insert(k.clone(), redact_scalar(k, v, secret_attrs));
    }
    Value::Object(out)
}

fn redact_value(v: &Value, secret_attrs: &HashSet<String>) -> Value {
    match v {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_scalar(k, v, secret_attrs));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn redact_scalar(key: &str, v: &Value, secret_attrs: &HashSet<String>) -> Value {
    if let Value::Object(_) = v {
        return redact_value(v, secret_attrs);
    }
    if secret_attrs.contains(key) {
        return Value::String(format!("<SECRET_VALUE({})>", type_name(v)));
    }
    if let Value::String(s) = v {
        if s.len() > LONG_STRING_LIMIT {
            let truncated: String = s.chars().take(LONG_STRING_LIMIT).collect();
            return Value::String(format!("<LONG_STR({}, '{truncated}...')>", s.len()));
        }
    }
    v.clone()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
