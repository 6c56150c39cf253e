// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hermes-core: object model, schema, and event primitives shared by the
//! client-side event-consumption engine.

pub mod clock;
pub mod data_object;
pub mod error;
pub mod event;
pub mod object_type;
pub mod pkey;

pub use clock::{Clock, FakeClock, SystemClock};
pub use data_object::DataObject;
pub use error::CoreError;
pub use event::{Event, EventCategory, EventType, ModifiedAttrs, LONG_STRING_LIMIT};
pub use object_type::{ForeignKey, ObjectType, Schema};
pub use pkey::PKey;
