// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps local type names to their [`TypeHandler`], plus the optional global
//! `on_save` hook, mirroring the engine's lookup of `on_<type>_<transition>`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::handler::{GlobalHandler, TypeHandler};

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    types: HashMap<String, Arc<dyn TypeHandler>>,
    global: Option<Arc<dyn GlobalHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, local_type: impl Into<String>, handler: Arc<dyn TypeHandler>) {
        self.types.insert(local_type.into(), handler);
    }

    pub fn set_global(&mut self, handler: Arc<dyn GlobalHandler>) {
        self.global = Some(handler);
    }

    pub fn get(&self, local_type: &str) -> Option<Arc<dyn TypeHandler>> {
        self.types.get(local_type).cloned()
    }

    pub async fn call_on_save(&self) -> Result<(), HandlerError> {
        match &self.global {
            Some(handler) => handler.on_save().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
