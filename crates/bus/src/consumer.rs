// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message bus consumer contract (§6): a scoped, offset-addressed, seekable
//! cursor over an ordered event stream, bounded by a per-read timeout.

use std::time::Duration;

use async_trait::async_trait;
use hermes_core::{Event, EventCategory};

use crate::error::BusError;

/// Transport-agnostic consumer of the Hermes event bus.
///
/// Implementations are not required to be thread-safe; the engine holds one
/// consumer per iteration, scoped to that iteration (§5).
#[async_trait]
pub trait BusConsumer: Send {
    async fn open(&mut self) -> Result<(), BusError>;
    async fn close(&mut self) -> Result<(), BusError>;

    async fn seek_to_beginning(&mut self) -> Result<(), BusError>;
    async fn seek(&mut self, offset: u64) -> Result<(), BusError>;

    /// `None` blocks indefinitely; `Some(d)` bounds each read by `d`.
    fn set_timeout(&mut self, timeout: Option<Duration>);

    /// Returns the next event in offset order, or `None` once the timeout
    /// elapses with no new event.
    async fn next_event(&mut self) -> Result<Option<Event>, BusError>;

    /// Scans forward (from the current cursor) for the next event whose
    /// category matches, skipping everything else.
    async fn find_next_event_of_category(
        &mut self,
        category: EventCategory,
    ) -> Result<Option<Event>, BusError> {
        loop {
            match self.next_event().await? {
                Some(ev) if ev.evcategory == category => return Ok(Some(ev)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
