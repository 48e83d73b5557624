//! Event types and in-process event distribution
//!
//! Every state change of the listening pipeline is an [`EarEvent`]. The daemon
//! appends each event as one JSON line to its event log and publishes it on
//! the [`EventBus`] for in-process listeners.

mod feature_types;
mod track_types;

pub use feature_types::{BandRatios, FeatureRecord};
pub use track_types::{RecognizedTrack, MANUAL_SOURCE};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Listening pipeline events
///
/// Serialized with an internal `type` tag so each log line is
/// self-describing, e.g. `{"type":"track_changed",...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EarEvent {
    /// Periodic liveness signal
    Heartbeat {
        alive: bool,
        uptime_seconds: f64,
        consecutive_failures: u32,
        /// Title of the current track, if any
        current_track: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Capture session opened
    StreamConnected {
        device: String,
        /// Failure counter value at the time of connection
        reconnect_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// Capture session failed to open or was lost
    StreamError {
        error: String,
        failures: u32,
        /// False when the failure counter reached its maximum and the
        /// supervisor is about to sleep through the cooldown
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },

    /// Features of the most recent analysis window
    AudioFeatures {
        features: FeatureRecord,
        /// Window was below the silence threshold; recognition was skipped
        silent: bool,
        timestamp: DateTime<Utc>,
    },

    /// Current track identity changed
    TrackChanged {
        track: RecognizedTrack,
        previous: Option<RecognizedTrack>,
        timestamp: DateTime<Utc>,
    },

    /// Lyric text found for the current track
    LyricsAvailable {
        title: String,
        artist: String,
        lyrics: String,
        /// "recognition" when delivered with the match, otherwise the lyric provider id
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// A past correction with similar features suggests this track
    FeedbackSuggestion {
        suggested: RecognizedTrack,
        confidence: String,
        timestamp: DateTime<Utc>,
    },

    /// Human correction recorded
    ManualCorrection {
        track: RecognizedTrack,
        previous: Option<RecognizedTrack>,
        timestamp: DateTime<Utc>,
    },

    /// Operator-visible failure that the daemon keeps running through
    CriticalError {
        error: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },
}

impl EarEvent {
    /// Wire name of the variant (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            EarEvent::Heartbeat { .. } => "heartbeat",
            EarEvent::StreamConnected { .. } => "stream_connected",
            EarEvent::StreamError { .. } => "stream_error",
            EarEvent::AudioFeatures { .. } => "audio_features",
            EarEvent::TrackChanged { .. } => "track_changed",
            EarEvent::LyricsAvailable { .. } => "lyrics_available",
            EarEvent::FeedbackSuggestion { .. } => "feedback_suggestion",
            EarEvent::ManualCorrection { .. } => "manual_correction",
            EarEvent::CriticalError { .. } => "critical_error",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EarEvent::Heartbeat { timestamp, .. }
            | EarEvent::StreamConnected { timestamp, .. }
            | EarEvent::StreamError { timestamp, .. }
            | EarEvent::AudioFeatures { timestamp, .. }
            | EarEvent::TrackChanged { timestamp, .. }
            | EarEvent::LyricsAvailable { timestamp, .. }
            | EarEvent::FeedbackSuggestion { timestamp, .. }
            | EarEvent::ManualCorrection { timestamp, .. }
            | EarEvent::CriticalError { timestamp, .. } => *timestamp,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// In-process event distribution
///
/// Wraps `tokio::broadcast`:
/// - Publishing never blocks (slow subscribers lag instead)
/// - Any number of concurrent subscribers
/// - Subscribers only see events emitted after they subscribed
///
/// ```
/// use ear_common::events::EventBus;
///
/// let bus = EventBus::new(256);
/// let mut rx = bus.subscribe();
/// // tokio::spawn(async move { while let Ok(event) = rx.recv().await { ... } });
/// # drop(rx);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EarEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EarEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: EarEvent) -> Result<usize, broadcast::error::SendError<EarEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: EarEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EarEvent {
        EarEvent::TrackChanged {
            track: RecognizedTrack::new("audd", "Teardrop", "Massive Attack"),
            previous: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = sample_event();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["track"]["title"], "Teardrop");
    }

    #[test]
    fn test_event_round_trips_from_log_line() {
        let line = serde_json::to_string(&EarEvent::CriticalError {
            error: "disk full".to_string(),
            kind: "persistence".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();

        let parsed: EarEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.event_type(), "critical_error");
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        assert!(bus.emit(sample_event()).is_err());
        bus.emit_lossy(sample_event());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(sample_event()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "track_changed");
    }
}
