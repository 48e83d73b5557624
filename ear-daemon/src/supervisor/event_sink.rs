//! Event log plus in-process publication
//!
//! Every event is appended as one JSON line to the per-run event log and
//! published on the [`EventBus`]. Publication happens even when the file
//! write fails.

use crate::error::{Error, Result};
use ear_common::{EarEvent, EventBus};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct EventSink {
    path: PathBuf,
    bus: EventBus,
    /// Lazily opened; dropped after a failed write so the next emit reopens
    file: Mutex<Option<File>>,
    echo_stdout: bool,
}

impl EventSink {
    pub fn new(path: impl Into<PathBuf>, bus: EventBus) -> Self {
        Self {
            path: path.into(),
            bus,
            file: Mutex::new(None),
            echo_stdout: false,
        }
    }

    /// Also print each event line to stdout, for piping into other tools
    pub fn echo_to_stdout(mut self, enabled: bool) -> Self {
        self.echo_stdout = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Append and publish. `Err(Error::Persistence)` only reports the file
    /// write; listeners have already received the event.
    pub fn emit(&self, event: EarEvent) -> Result<()> {
        let line = serde_json::to_string(&event);
        debug!(event_type = event.event_type(), "Emitting event");
        self.bus.emit_lossy(event);

        let line = line?;
        if self.echo_stdout {
            println!("{}", line);
        }

        self.append(&line).map_err(|e| {
            Error::Persistence(format!("Event log write to {} failed: {}", self.path.display(), e))
        })
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }

        let result = match guard.as_mut() {
            Some(file) => writeln!(file, "{}", line).and_then(|_| file.flush()),
            None => Ok(()),
        };
        if result.is_err() {
            *guard = None;
        }
        result
    }
}
