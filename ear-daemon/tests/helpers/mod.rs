//! Shared test infrastructure for ear-daemon integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod providers;

use ear_common::{EarEvent, EventBus, ManualClock};
use ear_daemon::audio::CaptureDevice;
use ear_daemon::feedback::FeedbackStore;
use ear_daemon::lyrics::LyricsChain;
use ear_daemon::recognition::RecognitionChain;
use ear_daemon::{DataPaths, EarConfig, Supervisor};
use providers::{CountingProvider, FixedLyrics};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const SAMPLE_RATE: u32 = 44_100;

/// Supervisor wired to scripted collaborators and a manual clock
pub struct Harness {
    pub dir: TempDir,
    pub supervisor: Arc<Supervisor>,
    pub clock: Arc<ManualClock>,
    pub recognition_calls: Arc<AtomicU32>,
    pub events: broadcast::Receiver<EarEvent>,
}

impl Harness {
    pub fn new(config: EarConfig, device: Arc<dyn CaptureDevice>) -> Self {
        let dir = TempDir::new().unwrap();
        Self::in_dir(dir, config, device, true)
    }

    /// Build on an existing root folder (simulated restart)
    pub fn in_dir(dir: TempDir, config: EarConfig, device: Arc<dyn CaptureDevice>, create_dirs: bool) -> Self {
        let clock = Arc::new(ManualClock::new());
        let paths = DataPaths::new(dir.path(), chrono::Utc::now());
        if create_dirs {
            paths.ensure_dirs().unwrap();
        }

        let (provider, recognition_calls) = CountingProvider::new("fake", Some("Track A"));
        let recognition = RecognitionChain::new(
            vec![Box::new(provider)],
            config.recognition.cooldown(),
            config.recognition.timeout(),
            clock.clone(),
        );
        let lyrics = LyricsChain::new(vec![Box::new(FixedLyrics("la la la"))], config.lyrics.timeout());
        let feedback = FeedbackStore::open(&paths.feedback_file).unwrap();

        let bus = EventBus::new(1024);
        let events = bus.subscribe();

        let supervisor = Arc::new(Supervisor::new(
            config,
            paths,
            device,
            recognition,
            lyrics,
            feedback,
            clock.clone(),
            bus,
        ));

        Self {
            dir,
            supervisor,
            clock,
            recognition_calls,
            events,
        }
    }

    pub fn calls(&self) -> u32 {
        self.recognition_calls.load(Ordering::SeqCst)
    }

    /// Everything published so far
    pub fn drain_events(&mut self) -> Vec<EarEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn test_config() -> EarConfig {
    let mut config = EarConfig::default();
    config.audio.sample_rate = SAMPLE_RATE;
    config
}

pub fn of_type<'a>(events: &'a [EarEvent], event_type: &str) -> Vec<&'a EarEvent> {
    events.iter().filter(|e| e.event_type() == event_type).collect()
}
