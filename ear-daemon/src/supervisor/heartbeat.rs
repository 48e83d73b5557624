//! Heartbeat file and persistence health tracking

use crate::error::{Error, Result};
use ear_common::HeartbeatState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::error;

/// Overwrites the heartbeat record in place.
///
/// The record is written to a sibling temp file and renamed over the target,
/// so a watchdog never reads a half-written file.
pub struct HeartbeatWriter {
    path: PathBuf,
}

impl HeartbeatWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, state: &HeartbeatState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");

        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                Error::Persistence(format!("Heartbeat write to {} failed: {}", self.path.display(), e))
            })
    }
}

/// Counts consecutive persistence failures per persisted file.
///
/// Each file keeps its own streak, so a file that always fails escalates
/// even while the others keep writing successfully.
#[derive(Debug)]
pub struct PersistenceHealth {
    threshold: u32,
    consecutive: HashMap<&'static str, u32>,
}

impl PersistenceHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: HashMap::new(),
        }
    }

    /// Record one write outcome for `what`. Returns the message for a
    /// `critical_error` event when that file's streak reaches the threshold;
    /// its counter then starts over.
    pub fn record(&mut self, what: &'static str, result: &Result<()>) -> Option<String> {
        match result {
            Ok(()) => {
                self.consecutive.remove(what);
                None
            }
            Err(e) => {
                let streak = self.consecutive.entry(what).or_insert(0);
                *streak += 1;
                error!(failures = *streak, "{} persistence failed: {}", what, e);
                if *streak >= self.threshold {
                    let message = format!("{} consecutive {} write failures, last: {}", streak, what, e);
                    self.consecutive.remove(what);
                    Some(message)
                } else {
                    None
                }
            }
        }
    }

    /// Current failure streak of `what`
    pub fn consecutive(&self, what: &str) -> u32 {
        self.consecutive.get(what).copied().unwrap_or(0)
    }
}
