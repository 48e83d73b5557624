//! End-to-end pipeline ticks against scripted providers

mod helpers;

use ear_common::{EarEvent, HeartbeatState};
use ear_daemon::analysis::FeatureExtractor;
use ear_daemon::audio::MockCaptureDevice;
use ear_daemon::config::AnalysisConfig;
use ear_daemon::feedback::FeedbackStore;
use ear_daemon::Error;
use helpers::audio_generator::{bass_pulse_train, silence};
use helpers::{of_type, test_config, Harness, SAMPLE_RATE};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn pulse_window() -> Vec<f32> {
    bass_pulse_train(174.0, 0.8, 2.0, 100.0, SAMPLE_RATE, 5.0)
}

#[tokio::test]
async fn test_silence_skips_recognition() {
    let mut h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    h.supervisor.ring().write(&silence(SAMPLE_RATE, 5.0));

    h.supervisor.tick().await.unwrap();

    assert_eq!(h.calls(), 0);
    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        EarEvent::AudioFeatures { features, silent, .. } => {
            assert!(*silent);
            assert!(features.rms.abs() < 1e-9);
        }
        other => panic!("Expected audio_features, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_buffer_counts_as_silence() {
    let mut h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));

    h.supervisor.tick().await.unwrap();

    assert_eq!(h.calls(), 0);
    assert_eq!(of_type(&h.drain_events(), "audio_features").len(), 1);
}

#[test]
fn test_bass_pulse_train_tempo() {
    let extractor = FeatureExtractor::new(SAMPLE_RATE, 5.0, AnalysisConfig::default());
    let record = extractor.extract(&pulse_window()).unwrap();

    assert!(
        (100.0..=140.0).contains(&record.estimated_bpm),
        "bpm {} outside 120 +/- 20",
        record.estimated_bpm
    );
    assert!((record.dominant_frequency - 174.0).abs() < 2.0);
    assert!(record.band_ratios.bass > 0.9);
}

#[tokio::test]
async fn test_recognition_switches_track_and_fetches_lyrics() {
    let mut h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    h.supervisor.ring().write(&pulse_window());

    h.supervisor.tick().await.unwrap();

    assert_eq!(h.calls(), 1);
    assert_eq!(h.supervisor.current_track().unwrap().title, "Track A");

    let events = h.drain_events();
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["audio_features", "track_changed", "lyrics_available"]);
    match &events[2] {
        EarEvent::LyricsAvailable { lyrics, source, .. } => {
            assert_eq!(lyrics, "la la la");
            assert_eq!(source, "fixed");
        }
        other => panic!("Expected lyrics_available, got {:?}", other),
    }

    let state = HeartbeatState::load(&h.supervisor.paths().state_file).unwrap();
    assert_eq!(state.current_track.unwrap().title, "Track A");
}

#[tokio::test]
async fn test_repeat_ticks_respect_recognition_cooldown() {
    let mut h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    h.supervisor.ring().write(&pulse_window());

    h.supervisor.tick().await.unwrap();
    h.clock.advance(Duration::from_secs(2));
    h.supervisor.tick().await.unwrap();
    h.clock.advance(Duration::from_secs(2));
    h.supervisor.tick().await.unwrap();
    assert_eq!(h.calls(), 1);

    h.clock.advance(Duration::from_secs(6));
    h.supervisor.tick().await.unwrap();
    assert_eq!(h.calls(), 2);

    // Same identity again: no second track change
    assert_eq!(of_type(&h.drain_events(), "track_changed").len(), 1);
}

#[tokio::test]
async fn test_correction_before_audio_is_rejected() {
    let h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));

    let err = h.supervisor.correct("Track X", "Artist X").unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(h.supervisor.current_track().is_none());
}

#[tokio::test]
async fn test_correction_with_missing_artist_is_rejected() {
    let h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    h.supervisor.ring().write(&pulse_window());
    h.supervisor.tick().await.unwrap();

    assert!(matches!(
        h.supervisor.correct("Track X", "  "),
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_correction_is_learned_for_similar_features() {
    let mut h = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    h.supervisor.ring().write(&pulse_window());
    h.supervisor.tick().await.unwrap();
    h.drain_events();

    let track = h.supervisor.correct("Track X", "Artist X").unwrap();
    assert_eq!(h.supervisor.current_track().unwrap(), track);

    let events = h.drain_events();
    match &events[0] {
        EarEvent::ManualCorrection { track, previous, .. } => {
            assert_eq!(track.title, "Track X");
            assert_eq!(previous.as_ref().unwrap().title, "Track A");
        }
        other => panic!("Expected manual_correction, got {:?}", other),
    }

    // Nearby features: bass within 0.05, tempo within 5 BPM
    let extractor = FeatureExtractor::new(SAMPLE_RATE, 5.0, AnalysisConfig::default());
    let mut nearby = extractor.extract(&pulse_window()).unwrap();
    nearby.band_ratios.bass -= 0.04;
    nearby.estimated_bpm += 4.0;

    let reopened = FeedbackStore::open(&h.supervisor.paths().feedback_file).unwrap();
    assert_eq!(reopened.len(), 1);
    let suggestion = reopened.suggest(&nearby).unwrap();
    assert_eq!(suggestion.title, "Track X");
    assert_eq!(suggestion.artist, "Artist X");
}

#[tokio::test]
async fn test_history_suggestion_survives_restart() {
    let first = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    first.supervisor.ring().write(&pulse_window());
    first.supervisor.tick().await.unwrap();
    first.supervisor.correct("Track X", "Artist X").unwrap();
    let Harness { dir, .. } = first;

    let mut config = test_config();
    config.pipeline.adopt_feedback_suggestions = true;
    let mut second = Harness::in_dir(dir, config, Arc::new(MockCaptureDevice::new()), true);
    second.supervisor.ring().write(&pulse_window());

    second.supervisor.tick().await.unwrap();

    // Adopted suggestion stands in for the external providers
    assert_eq!(second.calls(), 0);
    assert_eq!(second.supervisor.current_track().unwrap().title, "Track X");

    let events = second.drain_events();
    let suggestions = of_type(&events, "feedback_suggestion");
    assert_eq!(suggestions.len(), 1);
    match suggestions[0] {
        EarEvent::FeedbackSuggestion { suggested, confidence, .. } => {
            assert_eq!(suggested.title, "Track X");
            assert_eq!(confidence, "from_history");
        }
        other => panic!("Expected feedback_suggestion, got {:?}", other),
    }
    assert_eq!(of_type(&events, "track_changed").len(), 1);

    // Same window again: nothing new to suggest
    second.supervisor.tick().await.unwrap();
    assert!(of_type(&second.drain_events(), "feedback_suggestion").is_empty());
}

#[tokio::test]
async fn test_suggestion_without_adoption_still_recognizes() {
    let first = Harness::new(test_config(), Arc::new(MockCaptureDevice::new()));
    first.supervisor.ring().write(&pulse_window());
    first.supervisor.tick().await.unwrap();
    first.supervisor.correct("Track X", "Artist X").unwrap();
    let Harness { dir, .. } = first;

    let mut second = Harness::in_dir(dir, test_config(), Arc::new(MockCaptureDevice::new()), true);
    second.supervisor.ring().write(&pulse_window());
    second.supervisor.tick().await.unwrap();

    assert_eq!(second.calls(), 1);
    assert_eq!(second.supervisor.current_track().unwrap().title, "Track A");
    assert_eq!(of_type(&second.drain_events(), "feedback_suggestion").len(), 1);
}

#[tokio::test]
async fn test_repeated_persistence_failures_raise_critical_error() {
    let mut config = test_config();
    config.supervisor.persistence_failure_threshold = 3;
    // Log directory never created: every event-log append fails
    let mut h = Harness::in_dir(TempDir::new().unwrap(), config, Arc::new(MockCaptureDevice::new()), false);

    for _ in 0..3 {
        h.supervisor.tick().await.unwrap();
    }

    let events = h.drain_events();
    assert_eq!(of_type(&events, "audio_features").len(), 3);
    let critical = of_type(&events, "critical_error");
    assert_eq!(critical.len(), 1);
    match critical[0] {
        EarEvent::CriticalError { kind, .. } => assert_eq!(kind, "persistence"),
        other => panic!("Expected critical_error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failing_feedback_file_escalates_while_other_writes_succeed() {
    let mut config = test_config();
    config.supervisor.persistence_failure_threshold = 3;
    let mut h = Harness::new(config, Arc::new(MockCaptureDevice::new()));
    h.supervisor.ring().write(&pulse_window());
    h.supervisor.tick().await.unwrap();

    // Appending to a directory always fails; event log and heartbeat stay healthy
    std::fs::create_dir(&h.supervisor.paths().feedback_file).unwrap();
    h.drain_events();

    for i in 0..6 {
        h.supervisor.correct(&format!("Track {}", i), "Artist X").unwrap();
    }

    let events = h.drain_events();
    assert_eq!(of_type(&events, "manual_correction").len(), 6);
    let critical: Vec<&String> = of_type(&events, "critical_error")
        .into_iter()
        .filter_map(|e| match e {
            EarEvent::CriticalError { error, kind, .. } if kind == "persistence" => Some(error),
            _ => None,
        })
        .collect();
    assert_eq!(critical.len(), 2);
    assert!(critical[0].contains("feedback"));

    // The event log kept working throughout
    let log = std::fs::read_to_string(&h.supervisor.paths().event_log).unwrap();
    assert_eq!(log.lines().filter(|l| l.contains("\"manual_correction\"")).count(), 6);
}
