//! Prioritised lyric fallback chain with a per-process cache

use super::LyricsProvider;
use crate::http::ProviderError;
use ear_common::RecognizedTrack;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source reported when the recognition provider already supplied lyrics
pub const EMBEDDED_SOURCE: &str = "recognition";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLookup {
    pub text: String,
    /// Provider id, or [`EMBEDDED_SOURCE`]
    pub source: String,
}

pub struct LyricsChain {
    providers: Vec<Box<dyn LyricsProvider>>,
    timeout: Duration,
    /// Keyed by lowercased (title, artist); only hits are cached
    cache: Mutex<HashMap<(String, String), LyricLookup>>,
}

impl LyricsChain {
    pub fn new(providers: Vec<Box<dyn LyricsProvider>>, timeout: Duration) -> Self {
        Self {
            providers,
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(title: &str, artist: &str) -> (String, String) {
        (title.trim().to_lowercase(), artist.trim().to_lowercase())
    }

    fn cached(&self, key: &(String, String)) -> Option<LyricLookup> {
        self.cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    /// Lyrics for a recognized track.
    ///
    /// Lyrics embedded by the recognition provider are returned as-is and no
    /// lyric provider is contacted.
    pub async fn lyrics_for(&self, track: &RecognizedTrack) -> Option<LyricLookup> {
        if let Some(text) = track.embedded_lyrics() {
            debug!("Using lyrics embedded by {}", track.source);
            return Some(LyricLookup {
                text: text.to_string(),
                source: EMBEDDED_SOURCE.to_string(),
            });
        }
        self.get_lyrics(&track.title, &track.artist).await
    }

    /// Cached, first-success lookup across providers
    pub async fn get_lyrics(&self, title: &str, artist: &str) -> Option<LyricLookup> {
        let key = Self::cache_key(title, artist);
        if let Some(hit) = self.cached(&key) {
            debug!("Lyrics cache hit: {} - {}", artist, title);
            return Some(hit);
        }

        for provider in &self.providers {
            let id = provider.id();
            if !provider.is_configured() {
                debug!(provider = %id, "Skipping lyric provider: no credential");
                continue;
            }

            match self.fetch_from(provider.as_ref(), title, artist).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    info!(provider = %id, "Lyrics found: {} - {}", artist, title);
                    let lookup = LyricLookup {
                        text,
                        source: id.to_string(),
                    };
                    self.cache
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(key, lookup.clone());
                    return Some(lookup);
                }
                Ok(_) => debug!(provider = %id, "No lyrics"),
                Err(e) => warn!(provider = %id, "Lyric provider failed: {}", e),
            }
        }

        None
    }

    /// One provider call bounded by the chain timeout
    async fn fetch_from(
        &self,
        provider: &dyn LyricsProvider,
        title: &str,
        artist: &str,
    ) -> Result<Option<String>, ProviderError> {
        tokio::time::timeout(self.timeout, provider.fetch(title, artist))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.timeout)))
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
