// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL file-backed [`BusConsumer`] for development and integration tests.
//!
//! Grounded on the scan-on-open pattern of a write-ahead log: the whole file
//! is read and indexed once at `open()`, then `seek`/`next_event` walk the
//! in-memory index. A corrupt line is reported with its line number rather
//! than silently skipped, since the client here never wrote the file itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermes_core::Event;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::consumer::BusConsumer;
use crate::error::BusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BusRecord {
    offset: u64,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: Event,
}

pub struct JsonlBusConsumer {
    path: PathBuf,
    records: Vec<BusRecord>,
    cursor: usize,
    timeout: Option<Duration>,
}

impl JsonlBusConsumer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), records: Vec::new(), cursor: 0, timeout: None }
    }

    async fn load(path: &Path) -> Result<Vec<BusRecord>, BusError> {
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut out = Vec::new();
        let mut line_no: u64 = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: BusRecord = serde_json::from_str(trimmed)
                .map_err(|e| BusError::Corrupt { offset: line_no, message: e.to_string() })?;
            out.push(record);
        }
        Ok(out)
    }
}

#[async_trait]
impl BusConsumer for JsonlBusConsumer {
    async fn open(&mut self) -> Result<(), BusError> {
        self.records = Self::load(&self.path).await?;
        self.cursor = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        self.records.clear();
        self.cursor = 0;
        Ok(())
    }

    async fn seek_to_beginning(&mut self) -> Result<(), BusError> {
        self.cursor = 0;
        Ok(())
    }

    async fn seek(&mut self, offset: u64) -> Result<(), BusError> {
        let pos = self.records.iter().position(|r| r.offset == offset);
        match pos {
            Some(i) => {
                self.cursor = i;
                Ok(())
            }
            None => Err(BusError::UnknownOffset(offset)),
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    async fn next_event(&mut self) -> Result<Option<Event>, BusError> {
        if self.cursor >= self.records.len() {
            if let Some(timeout) = self.timeout {
                tokio::time::sleep(timeout).await;
            }
            return Ok(None);
        }
        let record = &self.records[self.cursor];
        self.cursor += 1;
        let mut event = record.event.clone();
        event.offset = Some(record.offset);
        event.timestamp = record.timestamp;
        Ok(Some(event))
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
