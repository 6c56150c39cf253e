// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-thread control flags (§5): the control socket thread only sets
//! pause/quit flags and reads a published status snapshot, never touching
//! the engine's caches directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::status::StatusSnapshot;

#[derive(Default)]
pub struct ControlFlags {
    paused: AtomicBool,
    quit: AtomicBool,
    /// Woken whenever a flag changes, so the 1s backoff/pause sleeps can be
    /// interrupted instead of always waiting out the full second.
    pub changed: Notify,
}

impl ControlFlags {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }
}

/// Status snapshot published by the main loop after every iteration, read
/// by the control socket's `status` command without touching engine state.
#[derive(Default)]
pub struct PublishedStatus(RwLock<StatusSnapshot>);

impl PublishedStatus {
    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.0.write() = snapshot;
    }

    pub fn current(&self) -> StatusSnapshot {
        self.0.read().clone()
    }
}

/// Shared handle the socket thread and the main loop both hold.
#[derive(Clone)]
pub struct ControlHandle {
    pub flags: Arc<ControlFlags>,
    pub status: Arc<PublishedStatus>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self { flags: Arc::new(ControlFlags::default()), status: Arc::new(PublishedStatus::default()) }
    }
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}
