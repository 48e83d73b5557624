//! Liveness record shared with external watchdogs
//!
//! The daemon overwrites this record in place every heartbeat interval and on
//! every state-changing event. A watchdog treats the daemon as dead when the
//! timestamp is older than a few intervals.

use crate::events::RecognizedTrack;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatState {
    pub timestamp: DateTime<Utc>,
    /// False only after a clean stop
    pub alive: bool,
    pub current_track: Option<RecognizedTrack>,
    pub consecutive_failures: u32,
    /// Identifies the process run that wrote this record
    pub session_id: Uuid,
    /// Event log of the current run
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl HeartbeatState {
    pub fn new(session_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            alive: true,
            current_track: None,
            consecutive_failures: 0,
            session_id,
            log_file: None,
        }
    }

    /// Read a heartbeat file written by the daemon
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// True when the record is older than `max_age` at `now`.
    ///
    /// A record timestamped in the future is not stale.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (now - self.timestamp).to_std() {
            Ok(age) => age > max_age,
            Err(_) => false,
        }
    }
}
