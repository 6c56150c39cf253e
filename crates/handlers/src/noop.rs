// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler that does nothing — used for types with no configured target
//! adapter behavior, or in minimal/dry-run deployments.

use async_trait::async_trait;

use crate::handler::{GlobalHandler, TypeHandler};

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl NoopHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TypeHandler for NoopHandler {}

#[async_trait]
impl GlobalHandler for NoopHandler {}

#[cfg(test)]
#[path = "noop_tests.rs"]
mod tests;
