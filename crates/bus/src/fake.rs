// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`BusConsumer`] test double with a fixed, pre-seeded event
//! sequence and offsets assigned by position.

use std::time::Duration;

use async_trait::async_trait;
use hermes_core::Event;

use crate::consumer::BusConsumer;
use crate::error::BusError;

pub struct FakeBusConsumer {
    events: Vec<Event>,
    cursor: usize,
    opened: bool,
}

impl FakeBusConsumer {
    pub fn new(events: Vec<Event>) -> Self {
        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, mut e)| {
                e.offset = Some(i as u64);
                e
            })
            .collect();
        Self { events, cursor: 0, opened: false }
    }
}

#[async_trait]
impl BusConsumer for FakeBusConsumer {
    async fn open(&mut self) -> Result<(), BusError> {
        self.opened = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        self.opened = false;
        Ok(())
    }

    async fn seek_to_beginning(&mut self) -> Result<(), BusError> {
        self.cursor = 0;
        Ok(())
    }

    async fn seek(&mut self, offset: u64) -> Result<(), BusError> {
        match self.events.iter().position(|e| e.offset == Some(offset)) {
            Some(i) => {
                self.cursor = i;
                Ok(())
            }
            None => Err(BusError::UnknownOffset(offset)),
        }
    }

    fn set_timeout(&mut self, _timeout: Option<Duration>) {}

    async fn next_event(&mut self) -> Result<Option<Event>, BusError> {
        if !self.opened {
            return Err(BusError::NotOpen);
        }
        if self.cursor >= self.events.len() {
            return Ok(None);
        }
        let event = self.events[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(event))
    }
}
