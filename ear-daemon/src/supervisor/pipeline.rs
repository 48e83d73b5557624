//! One analysis tick
//!
//! read buffer -> silence check -> features -> feedback history ->
//! recognition -> lyrics, emitting an event for each meaningful change.
//! Everything runs sequentially; at most one network call is in flight.

use super::Supervisor;
use crate::analysis::audio_fingerprint;
use crate::error::{Error, Result};
use ear_common::{EarEvent, RecognizedTrack};
use tracing::{debug, info};

/// `confidence` label of suggestions that come from the correction history
const HISTORY_CONFIDENCE: &str = "from_history";

impl Supervisor {
    /// Run the pipeline once over the most recent analysis window.
    ///
    /// Provider and persistence failures are absorbed here; the only error
    /// is a contract violation from feature extraction.
    pub async fn tick(&self) -> Result<()> {
        let samples = self.ring.read_last(self.config.analysis.window_seconds);
        let silent = self.extractor.is_silent(&samples);

        let features = self
            .extractor
            .extract(&samples)
            .map_err(|e| Error::ContractViolation(e.to_string()))?;

        self.emit(EarEvent::AudioFeatures {
            features,
            silent,
            timestamp: self.clock.utc_now(),
        });

        if silent {
            debug!("Silence, skipping recognition");
            return Ok(());
        }

        {
            let mut shared = self.shared();
            shared.last_features = Some(features);
            shared.last_fingerprint = Some(audio_fingerprint(&samples));
        }

        let suggestion = self
            .feedback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .suggest(&features);
        let adopted = suggestion.and_then(|s| self.consider_suggestion(s));

        let recognized = match adopted {
            Some(track) => Some(track),
            None => {
                self.recognition
                    .recognize(&samples, self.config.audio.sample_rate)
                    .await
            }
        };

        if let Some(track) = recognized {
            self.track_recognized(track).await;
        }
        Ok(())
    }

    /// Publish a history suggestion once per distinct track. Returns it when
    /// suggestions are configured to stand in for external recognition.
    fn consider_suggestion(&self, suggestion: RecognizedTrack) -> Option<RecognizedTrack> {
        let is_new = {
            let mut shared = self.shared();
            let already_current = shared
                .current_track
                .as_ref()
                .is_some_and(|t| t.same_identity(&suggestion));
            let already_suggested = shared
                .last_suggestion
                .as_ref()
                .is_some_and(|t| t.same_identity(&suggestion));

            if !already_suggested {
                shared.last_suggestion = Some(suggestion.clone());
            }
            !already_current && !already_suggested
        };

        if is_new {
            info!("History suggests: {} - {}", suggestion.artist, suggestion.title);
            self.emit(EarEvent::FeedbackSuggestion {
                suggested: suggestion.clone(),
                confidence: HISTORY_CONFIDENCE.to_string(),
                timestamp: self.clock.utc_now(),
            });
        }

        if self.config.pipeline.adopt_feedback_suggestions {
            Some(suggestion)
        } else {
            None
        }
    }

    /// Switch the current track when the identity changed, then look up lyrics
    async fn track_recognized(&self, track: RecognizedTrack) {
        let previous = {
            let mut shared = self.shared();
            if shared
                .current_track
                .as_ref()
                .is_some_and(|current| current.same_identity(&track))
            {
                return;
            }
            shared.current_track.replace(track.clone())
        };

        info!(source = %track.source, "Track changed: {} - {}", track.artist, track.title);
        self.emit(EarEvent::TrackChanged {
            track: track.clone(),
            previous,
            timestamp: self.clock.utc_now(),
        });
        self.touch_heartbeat(true);

        if let Some(lookup) = self.lyrics.lyrics_for(&track).await {
            self.emit(EarEvent::LyricsAvailable {
                title: track.title.clone(),
                artist: track.artist.clone(),
                lyrics: lookup.text,
                source: lookup.source,
                timestamp: self.clock.utc_now(),
            });
        }
    }
}
