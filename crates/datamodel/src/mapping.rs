// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Datamodel Mapping (C3): compiled, per-client mapping from remote
//! types/attributes to local types/attributes, computing the local schema
//! from the remote one and converting inbound remote events to local events.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use hermes_core::{DataObject, Event, EventCategory, EventType, ModifiedAttrs, ObjectType, Schema};
use indexmap::IndexMap;
use serde_json::Value;

use crate::config::TypeMappingConfig;
use crate::error::MappingError;
use crate::template::{CompiledTemplate, MappingRule};

/// Compiled mapping for a single local type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    pub local_type: String,
    pub hermes_type: String,
    /// local attribute name -> compiled rule over remote attributes
    pub attrs_mapping: IndexMap<String, MappingRule>,
    pub to_string: Option<CompiledTemplate>,
    pub trashbin_retention: Option<Duration>,
}

/// The full compiled datamodel: one [`TypeMapping`] per configured local
/// type, plus the warnings accumulated during compilation (unknown remote
/// types/attributes — not fatal, surfaced by the main loop).
#[derive(Debug, Clone, Default)]
pub struct Datamodel {
    pub types: IndexMap<String, TypeMapping>,
    pub warnings: HashSet<String>,
}

impl Datamodel {
    pub fn compile(
        configs: &[TypeMappingConfig],
        remote_schema: &Schema,
    ) -> Result<Self, MappingError> {
        let mut types = IndexMap::new();
        let mut warnings = HashSet::new();

        for cfg in configs {
            if types.contains_key(&cfg.local_type) {
                return Err(MappingError::DuplicateLocalType(cfg.local_type.clone()));
            }

            let remote_type = remote_schema.get(&cfg.hermes_type);
            if remote_type.is_none() {
                warnings.insert(format!(
                    "local type '{}' maps to unknown remote type '{}'",
                    cfg.local_type, cfg.hermes_type
                ));
            }

            let mut attrs_mapping = IndexMap::new();
            for (local_attr, raw_rule) in &cfg.attrs_mapping {
                let rule = MappingRule::parse(raw_rule);
                if let Some(remote_type) = remote_type {
                    for var in rule.free_variables() {
                        if !remote_type.attributes.contains(var) {
                            warnings.insert(format!(
                                "local type '{}' attribute '{}' references unknown remote attribute '{}'",
                                cfg.local_type, local_attr, var
                            ));
                        }
                    }
                }
                attrs_mapping.insert(local_attr.clone(), rule);
            }

            if let Some(remote_type) = remote_type {
                validate_primary_key_not_expression(&cfg.local_type, &attrs_mapping, remote_type)?;
            }

            types.insert(
                cfg.local_type.clone(),
                TypeMapping {
                    local_type: cfg.local_type.clone(),
                    hermes_type: cfg.hermes_type.clone(),
                    attrs_mapping,
                    to_string: cfg.to_string.as_deref().map(CompiledTemplate::compile),
                    trashbin_retention: cfg.trashbin_retention_secs.map(Duration::from_secs),
                },
            );
        }

        Ok(Self { types, warnings })
    }

    pub fn by_hermes_type(&self, hermes_type: &str) -> Option<&TypeMapping> {
        self.types.values().find(|t| t.hermes_type == hermes_type)
    }

    /// Computes the local schema induced by this mapping: each local type's
    /// attribute set is the mapping's target attribute names, its primary
    /// key is whatever the remote type's primary key maps to directly.
    pub fn local_schema(&self, remote_schema: &Schema) -> Schema {
        let mut out = IndexMap::new();
        for mapping in self.types.values() {
            let Some(remote_type) = remote_schema.get(&mapping.hermes_type) else { continue };
            let attrs: indexmap::IndexSet<String> = mapping.attrs_mapping.keys().cloned().collect();
            let pkey = local_primary_key(&mapping.attrs_mapping, remote_type).unwrap_or_default();
            out.insert(mapping.local_type.clone(), ObjectType::new(mapping.local_type.clone(), attrs, pkey));
        }
        Schema::new(out)
    }

    /// `convertEventToLocal` (§4.2): produces a local event from an inbound
    /// remote event, or `None` if the type is unmapped or the resulting
    /// event would carry no attributes (unless `force_empty` is set, used to
    /// preserve error-queue ordering).
    pub fn convert_event_to_local(
        &self,
        event: &Event,
        complete_remote_object: Option<&DataObject>,
        force_empty: bool,
    ) -> Option<Event> {
        let remote_type_name = event.objtype.as_ref()?;
        let mapping = self.by_hermes_type(remote_type_name)?;
        let objpkey = event.objpkey.clone()?;

        let complete_env: HashMap<String, Value> = complete_remote_object
            .map(|o| o.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let local_event = match event.eventtype {
            EventType::Added => {
                let attrs = event.added_attrs().unwrap_or_default();
                let env: HashMap<String, Value> = attrs.into_iter().collect();
                let local_attrs = self.convert_subtree(mapping, &env, &complete_env);
                if local_attrs.is_empty() && !force_empty {
                    return None;
                }
                Event::added(
                    mapping.local_type.clone(),
                    objpkey,
                    local_attrs.into_iter().collect(),
                    event.evcategory,
                )
            }
            EventType::Modified => {
                let diff = event.modified_attrs().unwrap_or_default();
                let added_env: HashMap<String, Value> = diff.added.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let modified_env: HashMap<String, Value> =
                    diff.modified.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

                let local_added = self.convert_subtree(mapping, &added_env, &complete_env);
                let local_modified = self.convert_subtree(mapping, &modified_env, &complete_env);
                let local_removed: IndexMap<String, Value> = diff
                    .removed
                    .keys()
                    .filter_map(|remote_attr| {
                        mapping
                            .attrs_mapping
                            .iter()
                            .find(|(_, rule)| matches!(rule, MappingRule::Direct(r) if r == remote_attr))
                            .map(|(local_attr, _)| (local_attr.clone(), Value::Null))
                    })
                    .collect();

                let out = ModifiedAttrs {
                    added: local_added.into_iter().collect(),
                    modified: local_modified.into_iter().collect(),
                    removed: local_removed,
                };
                if out.is_empty() && !force_empty {
                    return None;
                }
                Event::modified(mapping.local_type.clone(), objpkey, out, event.evcategory)
            }
            EventType::Removed => Event::removed(mapping.local_type.clone(), objpkey, event.evcategory),
            EventType::InitStart | EventType::InitStop | EventType::Dataschema => return None,
        };

        Some(local_event)
    }

    /// Projects one complete remote object into its local representation,
    /// used to rebuild a local type's projection from the `complete` remote
    /// cache after a datamodel change (§4.8), independent of any event.
    pub fn project_remote_object(&self, local_type: &str, remote_obj: &DataObject) -> Option<DataObject> {
        let mapping = self.types.get(local_type)?;
        let env: HashMap<String, Value> = remote_obj.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let attrs = self.convert_subtree(mapping, &env, &env);
        Some(DataObject::new(local_type, attrs.into_iter().collect()))
    }

    /// Converts one event subtree (`added`/`modified`) through every mapping
    /// rule. A template whose free variables aren't all present in `subtree`
    /// falls back to `complete_env` (the full remote object) per §4.2. A
    /// mapped value of `null` or `[]` is dropped — the local attribute is
    /// treated as absent from this subtree rather than explicitly nulled.
    fn convert_subtree(
        &self,
        mapping: &TypeMapping,
        subtree: &HashMap<String, Value>,
        complete_env: &HashMap<String, Value>,
    ) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for (local_attr, rule) in &mapping.attrs_mapping {
            let env = match rule {
                MappingRule::Template(t) if !t.all_vars_present(subtree) => complete_env,
                _ => subtree,
            };
            let Some(value) = rule.eval(env) else { continue };
            let is_null_or_empty_array = matches!(&value, Value::Null)
                || matches!(&value, Value::Array(a) if a.is_empty());
            if is_null_or_empty_array {
                continue;
            }
            out.push((local_attr.clone(), value));
        }
        out
    }
}

fn validate_primary_key_not_expression(
    local_type: &str,
    attrs_mapping: &IndexMap<String, MappingRule>,
    remote_type: &ObjectType,
) -> Result<(), MappingError> {
    for pkey_attr in &remote_type.primary_key {
        for (local_attr, rule) in attrs_mapping {
            if let MappingRule::Direct(remote_attr) = rule {
                if remote_attr == pkey_attr {
                    continue;
                }
            }
            if let MappingRule::Template(t) = rule {
                if t.free_vars().iter().any(|v| v == pkey_attr) {
                    return Err(MappingError::PrimaryKeyIsExpression {
                        local_type: local_type.to_string(),
                        local_attr: local_attr.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn local_primary_key(
    attrs_mapping: &IndexMap<String, MappingRule>,
    remote_type: &ObjectType,
) -> Option<Vec<String>> {
    let mut pkey = Vec::with_capacity(remote_type.primary_key.len());
    for remote_pkey_attr in &remote_type.primary_key {
        let local_attr = attrs_mapping
            .iter()
            .find(|(_, rule)| matches!(rule, MappingRule::Direct(r) if r == remote_pkey_attr))
            .map(|(local_attr, _)| local_attr.clone())?;
        pkey.push(local_attr);
    }
    Some(pkey)
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
