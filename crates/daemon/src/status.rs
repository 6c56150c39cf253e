// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status reporting (§4.7 step 6): an on-demand snapshot of per-component
//! information/warning/error facts, with edge-triggered notification so the
//! same fact set doesn't re-fire on every iteration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `{component -> {information|warning|error -> {key -> value}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub components: BTreeMap<String, ComponentStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    #[serde(default)]
    pub information: BTreeMap<String, String>,
    #[serde(default)]
    pub warning: BTreeMap<String, String>,
    #[serde(default)]
    pub error: BTreeMap<String, String>,
}

impl StatusSnapshot {
    pub fn component(&mut self, name: &str) -> &mut ComponentStatus {
        self.components.entry(name.to_string()).or_default()
    }

    /// Every `(component, key)` pair currently reporting an error, used by
    /// the main loop to compute the error-set notification edge.
    pub fn error_keys(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|(c, s)| s.error.keys().map(move |k| format!("{c}.{k}")))
            .collect()
    }

    pub fn warning_keys(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|(c, s)| s.warning.keys().map(move |k| format!("{c}.{k}")))
            .collect()
    }
}

/// A notification transition crossed between two successive snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEdge {
    ErrorsChanged,
    WarningsChanged,
    UnhandledExceptionChanged,
}

/// Pluggable notification sink (§4.7: "wiring to an actual mail transport is
/// out of scope"). The default just logs.
#[async_trait]
pub trait ObserverAdapter: Send + Sync {
    async fn notify(&self, edge: NotificationEdge, snapshot: &StatusSnapshot, unhandled_exception: Option<&str>);
}

#[derive(Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl ObserverAdapter for LoggingObserver {
    async fn notify(&self, edge: NotificationEdge, snapshot: &StatusSnapshot, unhandled_exception: Option<&str>) {
        match edge {
            NotificationEdge::ErrorsChanged => {
                tracing::warn!(errors = ?snapshot.error_keys(), "error set changed")
            }
            NotificationEdge::WarningsChanged => {
                tracing::warn!(warnings = ?snapshot.warning_keys(), "warning set changed")
            }
            NotificationEdge::UnhandledExceptionChanged => {
                tracing::error!(exception = unhandled_exception, "unhandled exception state changed")
            }
        }
    }
}

/// Compares two sets of (previously-notified vs. current) keys/exception
/// state and returns every edge that was crossed, in a stable order.
pub fn notification_edges(
    prev_errors: &[String],
    next_errors: &[String],
    prev_warnings: &[String],
    next_warnings: &[String],
    prev_exception: Option<&str>,
    next_exception: Option<&str>,
) -> Vec<NotificationEdge> {
    let mut edges = Vec::new();
    if prev_errors != next_errors {
        edges.push(NotificationEdge::ErrorsChanged);
    }
    if prev_warnings != next_warnings {
        edges.push(NotificationEdge::WarningsChanged);
    }
    if prev_exception != next_exception {
        edges.push(NotificationEdge::UnhandledExceptionChanged);
    }
    edges
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
