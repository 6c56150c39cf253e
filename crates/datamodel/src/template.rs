// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template-expression compiler for attribute mappings.
//!
//! A mapping's target attribute is either a plain remote attribute name or a
//! `${var}` template string over one or more remote attributes. Templates
//! are compiled once at datamodel load time: free variables are extracted up
//! front so unknown-attribute references can be reported as datamodel
//! warnings instead of failing at evaluation time for every event.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("constant regex pattern is valid"));

/// Either a direct remote-attribute rename or a compiled `${...}` template.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingRule {
    Direct(String),
    Template(CompiledTemplate),
}

impl MappingRule {
    pub fn parse(raw: &str) -> Self {
        if VAR_PATTERN.is_match(raw) {
            MappingRule::Template(CompiledTemplate::compile(raw))
        } else {
            MappingRule::Direct(raw.to_string())
        }
    }

    pub fn free_variables(&self) -> Vec<&str> {
        match self {
            MappingRule::Direct(attr) => vec![attr.as_str()],
            MappingRule::Template(t) => t.free_vars.iter().map(String::as_str).collect(),
        }
    }

    /// Evaluates the rule against a variable environment (typically a
    /// remote object's attributes). Returns `None` if a direct mapping's
    /// source attribute is absent from the environment.
    pub fn eval(&self, env: &HashMap<String, Value>) -> Option<Value> {
        match self {
            MappingRule::Direct(attr) => env.get(attr).cloned(),
            MappingRule::Template(t) => Some(Value::String(t.render(env))),
        }
    }
}

/// A `${var}` template compiled once at load time, with its free variables
/// extracted for datamodel-load validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    raw: String,
    free_vars: Vec<String>,
}

impl CompiledTemplate {
    pub fn compile(raw: &str) -> Self {
        let mut seen = Vec::new();
        for caps in VAR_PATTERN.captures_iter(raw) {
            let name = caps[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        Self { raw: raw.to_string(), free_vars: seen }
    }

    pub fn free_vars(&self) -> &[String] {
        &self.free_vars
    }

    /// Unknown variables are left as the literal `${name}` text, matching
    /// the interpolation behavior the mapping's warning set is built from.
    pub fn render(&self, env: &HashMap<String, Value>) -> String {
        VAR_PATTERN
            .replace_all(&self.raw, |caps: &regex::Captures| {
                let name = &caps[1];
                match env.get(name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .to_string()
    }

    /// `true` if every free variable in this template is present in `env`,
    /// used to decide whether `convertEventToLocal` must fall back to the
    /// complete remote object for a multi-variable template.
    pub fn all_vars_present(&self, env: &HashMap<String, Value>) -> bool {
        self.free_vars.iter().all(|v| env.contains_key(v))
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
