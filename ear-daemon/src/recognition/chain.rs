//! Throttled, prioritised recognition fallback chain

use super::RecognitionProvider;
use crate::audio::encode_wav;
use crate::http::ProviderError;
use ear_common::{Clock, RecognizedTrack};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Calls providers in order until one returns a well-formed match.
///
/// At most one attempt starts per cooldown window no matter how often
/// `recognize` is called. The attempt timestamp is taken before any provider
/// is contacted, so failed attempts are throttled too.
pub struct RecognitionChain {
    providers: Vec<Box<dyn RecognitionProvider>>,
    cooldown: Duration,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    last_attempt: Mutex<Option<Instant>>,
}

impl RecognitionChain {
    pub fn new(
        providers: Vec<Box<dyn RecognitionProvider>>,
        cooldown: Duration,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            cooldown,
            timeout,
            clock,
            last_attempt: Mutex::new(None),
        }
    }

    /// Number of providers with credentials
    pub fn configured_count(&self) -> usize {
        self.providers.iter().filter(|p| p.is_configured()).count()
    }

    /// Claim the attempt slot if the cooldown has elapsed
    fn begin_attempt(&self) -> bool {
        let now = self.clock.now();
        let mut last = self.last_attempt.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.cooldown {
                debug!(
                    "Recognition cooling down: {:?} of {:?} elapsed",
                    elapsed, self.cooldown
                );
                return false;
            }
        }

        *last = Some(now);
        true
    }

    /// Try to identify `samples`. Inside the cooldown window this returns
    /// `None` without contacting any provider.
    pub async fn recognize(&self, samples: &[f32], sample_rate: u32) -> Option<RecognizedTrack> {
        if !self.begin_attempt() {
            return None;
        }

        if self.configured_count() == 0 {
            debug!("No recognition provider configured");
            return None;
        }

        let wav = match encode_wav(samples, sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                warn!("WAV encoding failed, skipping recognition: {}", e);
                return None;
            }
        };

        for provider in &self.providers {
            let id = provider.id();
            if !provider.is_configured() {
                debug!(provider = %id, "Skipping provider: no credential");
                continue;
            }

            match self.identify_with(provider.as_ref(), &wav).await {
                Ok(Some(track)) if track.is_well_formed() => {
                    info!(provider = %id, "Recognized: {} - {}", track.artist, track.title);
                    return Some(track);
                }
                Ok(Some(_)) => {
                    warn!(provider = %id, "Provider returned a match without title/artist");
                }
                Ok(None) => {
                    debug!(provider = %id, "No match");
                }
                Err(e) => {
                    warn!(provider = %id, "Provider failed: {}", e);
                }
            }
        }

        None
    }

    /// One provider call bounded by the chain timeout
    async fn identify_with(
        &self,
        provider: &dyn RecognitionProvider,
        wav: &[u8],
    ) -> Result<Option<RecognizedTrack>, ProviderError> {
        tokio::time::timeout(self.timeout, provider.identify(wav))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.timeout)))
    }
}
