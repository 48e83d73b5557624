//! Capture lifecycle, periodic pipeline and reconnect policy
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Streaming -> Disconnected | Stopped
//! ```
//!
//! Device errors bump a failure counter and reconnect immediately. Once the
//! counter reaches `max_failures` the supervisor waits a fixed cooldown
//! (not exponential) and starts counting from zero again. Only the stop
//! signal or a contract violation ends `run`.
//!
//! Heartbeats fall due every `heartbeat_ms` regardless of what the loop is
//! doing: waiting on a provider inside a tick, sleeping between ticks, or
//! sitting out the failure cooldown.

pub mod event_sink;
pub mod heartbeat;
mod pipeline;

pub use event_sink::EventSink;
pub use heartbeat::{HeartbeatWriter, PersistenceHealth};

use crate::analysis::FeatureExtractor;
use crate::audio::{CaptureDevice, CaptureSession, CaptureSpec, RingBuffer};
use crate::config::{DataPaths, EarConfig};
use crate::error::{Error, Result};
use crate::feedback::FeedbackStore;
use crate::lyrics::LyricsChain;
use crate::recognition::RecognitionChain;
use ear_common::{Clock, EarEvent, EventBus, FeatureRecord, HeartbeatState, RecognizedTrack};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Streaming,
    Stopped,
}

/// Why a streaming session ended
enum SessionEnd {
    Stopped,
    Lost(String),
}

/// Mutable pipeline state shared by the tick loop and `correct`.
/// The lock is never held across an await.
#[derive(Debug)]
struct Shared {
    state: SupervisorState,
    consecutive_failures: u32,
    sessions_opened: u32,
    current_track: Option<RecognizedTrack>,
    last_features: Option<FeatureRecord>,
    last_fingerprint: Option<String>,
    last_suggestion: Option<RecognizedTrack>,
    last_heartbeat: Option<Instant>,
}

pub struct Supervisor {
    config: EarConfig,
    paths: DataPaths,
    device: Arc<dyn CaptureDevice>,
    ring: Arc<RingBuffer>,
    extractor: FeatureExtractor,
    recognition: RecognitionChain,
    lyrics: LyricsChain,
    feedback: Mutex<FeedbackStore>,
    clock: Arc<dyn Clock>,
    sink: EventSink,
    heartbeat: HeartbeatWriter,
    health: Mutex<PersistenceHealth>,
    shared: Mutex<Shared>,
    session_id: Uuid,
    started: Instant,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EarConfig,
        paths: DataPaths,
        device: Arc<dyn CaptureDevice>,
        recognition: RecognitionChain,
        lyrics: LyricsChain,
        feedback: FeedbackStore,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        let ring = Arc::new(RingBuffer::new(config.audio.sample_rate, config.audio.buffer_seconds));
        let extractor = FeatureExtractor::new(
            config.audio.sample_rate,
            config.analysis.window_seconds,
            config.analysis.clone(),
        );
        let sink = EventSink::new(&paths.event_log, bus);
        let heartbeat = HeartbeatWriter::new(&paths.state_file);
        let health = PersistenceHealth::new(config.supervisor.persistence_failure_threshold);
        let started = clock.now();

        Self {
            config,
            paths,
            device,
            ring,
            extractor,
            recognition,
            lyrics,
            feedback: Mutex::new(feedback),
            clock,
            sink,
            heartbeat,
            health: Mutex::new(health),
            shared: Mutex::new(Shared {
                state: SupervisorState::Disconnected,
                consecutive_failures: 0,
                sessions_opened: 0,
                current_track: None,
                last_features: None,
                last_fingerprint: None,
                last_suggestion: None,
                last_heartbeat: None,
            }),
            session_id: Uuid::new_v4(),
            started,
        }
    }

    /// Print event lines to stdout as well as the event log
    pub fn echo_events(mut self, enabled: bool) -> Self {
        self.sink = self.sink.echo_to_stdout(enabled);
        self
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> SupervisorState {
        self.shared().state
    }

    pub fn current_track(&self) -> Option<RecognizedTrack> {
        self.shared().current_track.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared().consecutive_failures
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Sample store the capture session writes into
    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    fn set_state(&self, state: SupervisorState) {
        self.shared().state = state;
    }

    fn capture_spec(&self) -> CaptureSpec {
        CaptureSpec {
            sample_rate: self.config.audio.sample_rate,
            channels: self.config.audio.channels,
            block_samples: self.config.audio.block_samples(),
            device: self.config.audio.device.clone(),
        }
    }

    /// Drive the capture lifecycle until `cancel` fires.
    ///
    /// Recoverable errors never end this loop. The only error returned is a
    /// contract violation from the pipeline.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            session_id = %self.session_id,
            "Supervisor starting: event log {}, heartbeat {}",
            self.paths.event_log.display(),
            self.paths.state_file.display()
        );
        if self.recognition.configured_count() == 0 {
            warn!("No recognition provider configured (set AUDD_API_TOKEN or SHAZAM_API_KEY)");
        }
        self.touch_heartbeat(true);

        let outcome = self.connect_loop(&cancel).await;

        self.set_state(SupervisorState::Stopped);
        self.touch_heartbeat(false);
        match &outcome {
            Ok(()) => info!("Supervisor stopped"),
            Err(e) => error!("Supervisor stopped on fatal error: {}", e),
        }
        outcome
    }

    async fn connect_loop(&self, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            self.set_state(SupervisorState::Connecting);

            match self.open_session().await {
                Ok(session) => {
                    let reconnect_count = {
                        let mut shared = self.shared();
                        shared.state = SupervisorState::Streaming;
                        shared.sessions_opened += 1;
                        shared.sessions_opened - 1
                    };
                    info!("Streaming from {}", session.device_name());
                    self.emit(EarEvent::StreamConnected {
                        device: session.device_name().to_string(),
                        reconnect_count,
                        timestamp: self.clock.utc_now(),
                    });

                    let end = self.stream(session.as_ref(), cancel).await;
                    close_session(session).await;

                    match end? {
                        SessionEnd::Stopped => break,
                        SessionEnd::Lost(reason) => self.on_device_failure(reason, cancel).await,
                    }
                }
                Err(e) => self.on_device_failure(e.to_string(), cancel).await,
            }
        }
        Ok(())
    }

    /// Opening may block (device enumeration, stream start), so it runs on
    /// the blocking pool.
    async fn open_session(&self) -> Result<Box<dyn CaptureSession>> {
        let device = Arc::clone(&self.device);
        let ring = Arc::clone(&self.ring);
        let spec = self.capture_spec();

        tokio::task::spawn_blocking(move || device.open(&spec, ring))
            .await
            .map_err(|e| Error::Device(format!("Capture open task failed: {}", e)))?
    }

    /// Tick loop for one open session
    async fn stream(&self, session: &dyn CaptureSession, cancel: &CancellationToken) -> Result<SessionEnd> {
        let mut first_tick = true;
        loop {
            if cancel.is_cancelled() {
                return Ok(SessionEnd::Stopped);
            }
            if let Err(e) = session.check() {
                return Ok(SessionEnd::Lost(e.to_string()));
            }

            self.tick_keeping_heartbeat().await?;

            if first_tick {
                first_tick = false;
                let mut shared = self.shared();
                if shared.consecutive_failures > 0 {
                    info!(
                        "Session healthy after {} failures, resetting counter",
                        shared.consecutive_failures
                    );
                    shared.consecutive_failures = 0;
                }
            }

            if !self.beat_if_due() {
                self.touch_heartbeat(true);
            }

            if self.sleep_keeping_heartbeat(self.config.pipeline.tick_interval(), cancel).await {
                return Ok(SessionEnd::Stopped);
            }
        }
    }

    /// Run one tick while beating on schedule. Recognition and lyric calls
    /// can take many heartbeat intervals.
    async fn tick_keeping_heartbeat(&self) -> Result<()> {
        let tick = self.tick();
        tokio::pin!(tick);

        loop {
            let wait = self.until_next_beat();
            if wait.is_zero() {
                self.beat();
                continue;
            }
            tokio::select! {
                biased;
                result = &mut tick => return result,
                _ = self.clock.sleep(wait) => self.beat(),
            }
        }
    }

    async fn on_device_failure(&self, reason: String, cancel: &CancellationToken) {
        let max = self.config.supervisor.max_failures;
        let failures = {
            let mut shared = self.shared();
            shared.state = SupervisorState::Disconnected;
            shared.consecutive_failures += 1;
            shared.consecutive_failures
        };
        let will_retry = failures < max;

        warn!(failures, max_failures = max, "Capture error: {}", reason);
        self.emit(EarEvent::StreamError {
            error: reason,
            failures,
            will_retry,
            timestamp: self.clock.utc_now(),
        });
        self.touch_heartbeat(true);

        if failures >= max {
            let cooldown = self.config.supervisor.failure_cooldown();
            warn!("{} consecutive capture failures, pausing {:?} before retrying", failures, cooldown);
            if self.sleep_keeping_heartbeat(cooldown, cancel).await {
                return;
            }
            self.shared().consecutive_failures = 0;
        }
    }

    /// Sleep `total`, waking for every heartbeat that falls due meanwhile.
    /// True when cancelled before the sleep finished.
    async fn sleep_keeping_heartbeat(&self, total: Duration, cancel: &CancellationToken) -> bool {
        let mut remaining = total;

        while !remaining.is_zero() {
            let wait = self.until_next_beat();
            if wait.is_zero() {
                self.beat();
                continue;
            }
            let step = remaining.min(wait);
            if self.sleep_or_cancel(step, cancel).await {
                return true;
            }
            remaining -= step;
            self.beat_if_due();
        }
        false
    }

    /// True when cancelled before the sleep finished
    async fn sleep_or_cancel(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = self.clock.sleep(duration) => cancel.is_cancelled(),
        }
    }

    /// Emit the heartbeat event and overwrite the heartbeat file
    fn beat(&self) {
        let now = self.clock.now();
        let (failures, title) = {
            let mut shared = self.shared();
            shared.last_heartbeat = Some(now);
            (
                shared.consecutive_failures,
                shared.current_track.as_ref().map(|t| t.title.clone()),
            )
        };

        self.emit(EarEvent::Heartbeat {
            alive: true,
            uptime_seconds: now.saturating_duration_since(self.started).as_secs_f64(),
            consecutive_failures: failures,
            current_track: title,
            timestamp: self.clock.utc_now(),
        });
        self.touch_heartbeat(true);
    }

    /// Time left before the next heartbeat is due. Before the first beat a
    /// full interval is allowed.
    fn until_next_beat(&self) -> Duration {
        let interval = self.config.pipeline.heartbeat_interval();
        match self.shared().last_heartbeat {
            Some(last) => interval.saturating_sub(self.clock.now().saturating_duration_since(last)),
            None => interval,
        }
    }

    /// `beat` when the heartbeat interval has elapsed; returns whether it did
    fn beat_if_due(&self) -> bool {
        let due = match self.shared().last_heartbeat {
            Some(last) => {
                self.clock.now().saturating_duration_since(last) >= self.config.pipeline.heartbeat_interval()
            }
            None => true,
        };
        if due {
            self.beat();
        }
        due
    }

    /// Overwrite the heartbeat file with the current state
    fn touch_heartbeat(&self, alive: bool) {
        let mut state = HeartbeatState::new(self.session_id, self.clock.utc_now());
        {
            let shared = self.shared();
            state.current_track = shared.current_track.clone();
            state.consecutive_failures = shared.consecutive_failures;
        }
        state.alive = alive;
        state.log_file = Some(self.paths.event_log.clone());

        let result = self.heartbeat.write(&state);
        self.record_persistence("heartbeat", result);
    }

    /// Log and publish an event, tracking event-log write failures
    fn emit(&self, event: EarEvent) {
        let result = self.sink.emit(event);
        self.record_persistence("event log", result);
    }

    fn record_persistence(&self, what: &'static str, result: Result<()>) {
        let critical = self
            .health
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .record(what, &result);

        if let Some(message) = critical {
            // Published even if the event log itself is what keeps failing
            let _ = self.sink.emit(EarEvent::CriticalError {
                error: message,
                kind: "persistence".to_string(),
                timestamp: self.clock.utc_now(),
            });
        }
    }

    /// Manual correction: the most recent features get `artist - title` as
    /// their correct track, and the current track switches immediately.
    ///
    /// Fails with `InvalidState` before any non-silent window was analysed.
    pub fn correct(&self, title: &str, artist: &str) -> Result<RecognizedTrack> {
        let track = RecognizedTrack::manual(title.trim(), artist.trim());
        if !track.is_well_formed() {
            return Err(Error::InvalidState("Correction needs both title and artist".to_string()));
        }

        let (features, fingerprint, previous) = {
            let mut shared = self.shared();
            let features = shared.last_features.ok_or_else(|| {
                Error::InvalidState("No audio analysed yet, nothing to correct".to_string())
            })?;
            let fingerprint = shared.last_fingerprint.clone().unwrap_or_default();
            let previous = shared.current_track.replace(track.clone());
            (features, fingerprint, previous)
        };

        let recorded = self
            .feedback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .record_correction(features, previous.clone(), track.clone(), fingerprint)
            .map(|_| ());
        self.record_persistence("feedback", recorded);

        info!(
            previous = ?previous.as_ref().map(|t| t.title.as_str()),
            "Manual correction: {} - {}", track.artist, track.title
        );
        self.emit(EarEvent::ManualCorrection {
            track: track.clone(),
            previous,
            timestamp: self.clock.utc_now(),
        });
        self.touch_heartbeat(true);

        Ok(track)
    }
}

async fn close_session(session: Box<dyn CaptureSession>) {
    if let Err(e) = tokio::task::spawn_blocking(move || session.close()).await {
        warn!("Capture close task failed: {}", e);
    }
}
