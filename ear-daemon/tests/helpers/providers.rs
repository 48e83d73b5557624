//! Scripted provider implementations

use async_trait::async_trait;
use ear_common::RecognizedTrack;
use ear_daemon::http::ProviderError;
use ear_daemon::lyrics::LyricsProvider;
use ear_daemon::recognition::RecognitionProvider;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Recognition provider returning a fixed title and counting calls
pub struct CountingProvider {
    id: &'static str,
    title: Option<&'static str>,
    calls: Arc<AtomicU32>,
}

impl CountingProvider {
    pub fn new(id: &'static str, title: Option<&'static str>) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                id,
                title,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl RecognitionProvider for CountingProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn identify(&self, _wav: &[u8]) -> Result<Option<RecognizedTrack>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.title.map(|t| RecognizedTrack::new(self.id, t, "Test Artist")))
    }
}

/// Lyric provider that always knows the words
pub struct FixedLyrics(pub &'static str);

#[async_trait]
impl LyricsProvider for FixedLyrics {
    fn id(&self) -> &str {
        "fixed"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch(&self, _title: &str, _artist: &str) -> Result<Option<String>, ProviderError> {
        Ok(Some(self.0.to_string()))
    }
}

/// Recognition provider that never answers within any sane timeout
pub struct StalledProvider;

#[async_trait]
impl RecognitionProvider for StalledProvider {
    fn id(&self) -> &str {
        "stalled"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn identify(&self, _wav: &[u8]) -> Result<Option<RecognizedTrack>, ProviderError> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(None)
    }
}
