// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Datamodel mapping: `hermes.toml` configuration parsing, the template
//! compiler for attribute expressions, and the compiled per-client mapping
//! from remote to local types used by `convertEventToLocal`.

mod config;
mod error;
mod mapping;
mod template;

pub use config::{
    AutoremediationMode, BusConfig, CacheConfig, ErrorQueueConfig, ForeignKeyPolicy, HermesConfig,
    HermesSection, LogsConfig, LoopConfig, SocketConfig, TypeMappingConfig,
};
pub use error::MappingError;
pub use mapping::{Datamodel, TypeMapping};
pub use template::{CompiledTemplate, MappingRule};
