// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A value of some [`ObjectType`], as stored in the dual cache and trashbin.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::object_type::ObjectType;
use crate::pkey::PKey;

/// A concrete instance of an [`ObjectType`]. Equality and ordering are
/// defined in terms of the owning type's comparable attributes (everything
/// except local-only and cache-only attributes) and primary key,
/// respectively — see [`DataObject::comparable_eq`] and
/// [`DataObject::pkey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub object_type: String,
    pub attrs: IndexMap<String, Value>,
    pub trashbin_timestamp: Option<DateTime<Utc>>,
}

impl DataObject {
    pub fn new(object_type: impl Into<String>, attrs: IndexMap<String, Value>) -> Self {
        Self { object_type: object_type.into(), attrs, trashbin_timestamp: None }
    }

    pub fn pkey(&self, schema_type: &ObjectType) -> Result<PKey, CoreError> {
        let mut values = Vec::with_capacity(schema_type.primary_key.len());
        for attr in &schema_type.primary_key {
            let v = self.attrs.get(attr).ok_or_else(|| CoreError::MissingPrimaryKeyValue {
                objtype: schema_type.name.clone(),
                attr: attr.clone(),
            })?;
            values.push(v.clone());
        }
        Ok(if values.len() == 1 { PKey::single(values.remove(0)) } else { PKey::tuple(values) })
    }

    /// Equality restricted to the type's comparable attributes (excludes
    /// local-only and cache-only attributes), matching the original's
    /// `__eq__`/`__hash__` override.
    pub fn comparable_eq(&self, other: &DataObject, schema_type: &ObjectType) -> bool {
        if self.object_type != other.object_type {
            return false;
        }
        schema_type
            .attributes
            .iter()
            .filter(|a| schema_type.is_comparable_attr(a))
            .all(|a| self.attrs.get(a) == other.attrs.get(a))
    }

    /// Attributes to send over the bus: excludes local-only attributes.
    pub fn to_event_attrs(&self, schema_type: &ObjectType) -> IndexMap<String, Value> {
        self.attrs
            .iter()
            .filter(|(k, _)| schema_type.is_sendable_attr(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_trashed(&self) -> bool {
        self.trashbin_timestamp.is_some()
    }

    /// A printable representation with secret attributes redacted and long
    /// string attributes truncated, matching `Event.objattrsToString`.
    pub fn redacted_display(&self, secret_attrs: &std::collections::HashSet<String>) -> String {
        crate::event::redact_attrs(&self.attrs, secret_attrs).to_string()
    }
}

#[cfg(test)]
#[path = "data_object_tests.rs"]
mod tests;
