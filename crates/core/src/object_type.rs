// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object type schema: named record shape shared by remote and local datamodels.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A foreign key from one type's (primary-key) attribute to another type's
/// single-attribute primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub other_type: String,
    pub other_pkey_attr: String,
}

/// Named record with an ordered attribute set, a primary-key specification,
/// and the attribute classifications that govern hashing, caching, and
/// serialization onto the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    pub attributes: IndexSet<String>,
    /// Ordered attribute names forming the primary key (single attribute or tuple).
    pub primary_key: Vec<String>,
    pub secret_attrs: HashSet<String>,
    pub local_only_attrs: HashSet<String>,
    pub cache_only_attrs: HashSet<String>,
    pub display_template: Option<String>,
    pub foreign_keys: HashMap<String, ForeignKey>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>, attributes: IndexSet<String>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            attributes,
            primary_key,
            secret_attrs: HashSet::new(),
            local_only_attrs: HashSet::new(),
            cache_only_attrs: HashSet::new(),
            display_template: None,
            foreign_keys: HashMap::new(),
        }
    }

    /// Attributes that participate in cache equality/hash and in the event
    /// payload sent over the bus: everything except local-only and
    /// cache-only attributes.
    pub fn is_comparable_attr(&self, attr: &str) -> bool {
        !self.local_only_attrs.contains(attr) && !self.cache_only_attrs.contains(attr)
    }

    pub fn is_sendable_attr(&self, attr: &str) -> bool {
        !self.local_only_attrs.contains(attr)
    }

    /// Validates the invariants that hold for a single type in isolation;
    /// cross-type invariants (foreign-key target shape, acyclicity) are
    /// checked by [`Schema::validate`].
    pub fn validate_self(&self) -> Result<(), CoreError> {
        if self.primary_key.is_empty() {
            return Err(CoreError::EmptyPrimaryKey(self.name.clone()));
        }
        for attr in &self.primary_key {
            if !self.attributes.contains(attr) {
                return Err(CoreError::UnknownAttribute {
                    objtype: self.name.clone(),
                    attr: attr.clone(),
                });
            }
        }
        for (attr, _) in &self.foreign_keys {
            if !self.primary_key.contains(attr) {
                return Err(CoreError::ForeignKeySourceNotPkey {
                    objtype: self.name.clone(),
                    attr: attr.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A full set of [`ObjectType`]s, with cross-type invariants enforced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub types: indexmap::IndexMap<String, ObjectType>,
}

impl Schema {
    pub fn new(types: indexmap::IndexMap<String, ObjectType>) -> Self {
        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name)
    }

    /// Validates every type, then the cross-type foreign-key invariants: a
    /// foreign key's target attribute must be the target type's single
    /// attribute primary key, and the overall foreign-key graph must be
    /// acyclic.
    pub fn validate(&self) -> Result<(), CoreError> {
        for t in self.types.values() {
            t.validate_self()?;
        }
        for t in self.types.values() {
            for fk in t.foreign_keys.values() {
                let other = self
                    .types
                    .get(&fk.other_type)
                    .ok_or_else(|| CoreError::UnknownType(fk.other_type.clone()))?;
                if other.primary_key.len() != 1 || other.primary_key[0] != fk.other_pkey_attr {
                    return Err(CoreError::ForeignKeyTargetNotPkey {
                        other_type: fk.other_type.clone(),
                        other_attr: fk.other_pkey_attr.clone(),
                    });
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: HashMap<&str, Mark> =
            self.types.keys().map(|k| (k.as_str(), Mark::Unvisited)).collect();

        fn visit<'a>(
            name: &'a str,
            schema: &'a Schema,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), CoreError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(CoreError::ForeignKeyCycle(name.to_string())),
                _ => {}
            }
            marks.insert(name, Mark::InProgress);
            if let Some(t) = schema.types.get(name) {
                for fk in t.foreign_keys.values() {
                    visit(&fk.other_type, schema, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for name in self.types.keys() {
            visit(name, self, &mut marks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "object_type_tests.rs"]
mod tests;
