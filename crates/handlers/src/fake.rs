// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording test double for [`TypeHandler`]/[`GlobalHandler`], gated behind
//! `test-support` so the engine crate can assert on call order/arguments
//! without a real target adapter.

use async_trait::async_trait;
use hermes_core::PKey;
use parking_lot::Mutex;

use crate::context::HandlerContext;
use crate::error::HandlerError;
use crate::handler::{Attrs, GlobalHandler, TypeHandler};

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerCall {
    Added(PKey),
    Modified(PKey),
    Removed(PKey),
    Trashed(PKey),
    Recycled(PKey),
    OnSave,
}

/// A [`TypeHandler`]/[`GlobalHandler`] that records every call it receives
/// and optionally fails a configured set of pkeys, for exercising the error
/// queue and retry paths.
#[derive(Default)]
pub struct FakeHandler {
    calls: Mutex<Vec<HandlerCall>>,
    fail_pkeys: Mutex<std::collections::HashSet<PKey>>,
}

impl FakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    pub fn fail_on(&self, pkey: PKey) {
        self.fail_pkeys.lock().insert(pkey);
    }

    fn check(&self, pkey: &PKey) -> Result<(), HandlerError> {
        if self.fail_pkeys.lock().contains(pkey) {
            return Err(HandlerError::new(format!("fake handler configured to fail for {pkey}")));
        }
        Ok(())
    }
}

#[async_trait]
impl TypeHandler for FakeHandler {
    async fn on_added(&self, pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        self.calls.lock().push(HandlerCall::Added(pkey.clone()));
        self.check(pkey)
    }

    async fn on_modified(
        &self,
        pkey: &PKey,
        _attrs: &Attrs,
        _cached: &Attrs,
        _ctx: &mut HandlerContext,
    ) -> Result<(), HandlerError> {
        self.calls.lock().push(HandlerCall::Modified(pkey.clone()));
        self.check(pkey)
    }

    async fn on_removed(&self, pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        self.calls.lock().push(HandlerCall::Removed(pkey.clone()));
        self.check(pkey)
    }

    async fn on_trashed(&self, pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        self.calls.lock().push(HandlerCall::Trashed(pkey.clone()));
        self.check(pkey)
    }

    async fn on_recycled(&self, pkey: &PKey, _attrs: &Attrs, _ctx: &mut HandlerContext) -> Result<(), HandlerError> {
        self.calls.lock().push(HandlerCall::Recycled(pkey.clone()));
        self.check(pkey)
    }
}

#[async_trait]
impl GlobalHandler for FakeHandler {
    async fn on_save(&self) -> Result<(), HandlerError> {
        self.calls.lock().push(HandlerCall::OnSave);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
