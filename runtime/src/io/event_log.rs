//! Append-only JSONL event log (`events.jsonl`).
//!
//! Each line is one canonical JSON object `{event_type, payload, timestamp}`
//! with sorted keys and compact separators.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::canonical::to_canonical_json;
use crate::core::events::{EventSink, RuntimeEvent};

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub timestamp: String,
    pub payload: Value,
}

impl EventRecord {
    pub fn new(timestamp: &str, event: &RuntimeEvent) -> Result<Self> {
        let mut value = serde_json::to_value(event).context("serialize event")?;
        let payload = value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(Self {
            event_type: event.event_type().to_string(),
            timestamp: timestamp.to_string(),
            payload,
        })
    }
}

/// File-backed [`EventSink`] appending one line per event.
#[derive(Debug, Clone)]
pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in append order. A missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<EventRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read event log {}", self.path.display()))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("parse event log {} line {}", self.path.display(), idx + 1)
                })
            })
            .collect()
    }
}

impl EventSink for JsonlEventLog {
    fn emit(&mut self, timestamp: &str, event: &RuntimeEvent) -> Result<()> {
        let record = EventRecord::new(timestamp, event)?;
        let mut line = to_canonical_json(&record).context("serialize event record")?;
        line.push('\n');
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open event log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append event log {}", self.path.display()))?;
        Ok(())
    }
}
