// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interval timers for the main loop: error-queue retry, trashbin purge.
//! Each timer is identified by name and re-armed by the caller after firing;
//! the scheduler itself just tracks deadlines.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Timer {
    fires_at: Instant,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<String, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timer(&mut self, id: impl Into<String>, duration: Duration, now: Instant) {
        self.timers.insert(id.into(), Timer { fires_at: now + duration });
    }

    pub fn cancel_timer(&mut self, id: &str) {
        self.timers.remove(id);
    }

    /// Returns the ids of every timer that has fired, removing them.
    pub fn fired_timers(&mut self, now: Instant) -> Vec<String> {
        let fired: Vec<String> =
            self.timers.iter().filter(|(_, t)| t.fires_at <= now).map(|(id, _)| id.clone()).collect();
        for id in &fired {
            self.timers.remove(id);
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    pub fn has_timer(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
