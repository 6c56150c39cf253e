// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The target adapter's per-type handler contract (§6): `on_<type>_<transition>`
//! callbacks, modeled as one `TypeHandler` implementation per local type
//! rather than string-dispatched methods, plus the global `on_save` hook.

use async_trait::async_trait;
use hermes_core::PKey;
use indexmap::IndexMap;
use serde_json::Value;

use crate::context::HandlerContext;
use crate::error::HandlerError;

pub type Attrs = IndexMap<String, Value>;

/// Per-type transition callbacks. Every method defaults to a no-op so a
/// target adapter only needs to implement the transitions it cares about,
/// matching the "when defined" language in §6.
#[async_trait]
pub trait TypeHandler: Send + Sync {
    async fn on_added(&self, _pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn on_modified(
        &self,
        _pkey: &PKey,
        _attrs: &Attrs,
        _cached: &Attrs,
        _ctx: &mut HandlerContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn on_removed(&self, _pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn on_trashed(&self, _pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn on_recycled(&self, _pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// The global `on_save()` hook, called once after each main-loop iteration
/// in which any state changed.
#[async_trait]
pub trait GlobalHandler: Send + Sync {
    async fn on_save(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
