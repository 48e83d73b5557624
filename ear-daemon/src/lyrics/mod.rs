//! Lyric lookup through external services

pub mod chain;
pub mod genius;
pub mod lyrics_ovh;

pub use chain::{LyricLookup, LyricsChain, EMBEDDED_SOURCE};
pub use genius::GeniusProvider;
pub use lyrics_ovh::LyricsOvhProvider;

use crate::config::LyricsConfig;
use crate::http::ProviderError;
use async_trait::async_trait;

#[async_trait]
pub trait LyricsProvider: Send + Sync {
    fn id(&self) -> &str;

    /// False when a required credential is missing; the chain then skips it
    fn is_configured(&self) -> bool;

    /// Plain-text lyrics, `Ok(None)` when the provider has none
    async fn fetch(&self, title: &str, artist: &str) -> Result<Option<String>, ProviderError>;
}

/// Providers in priority order: Genius, then lyrics.ovh (keyless)
pub fn default_providers(config: &LyricsConfig) -> Result<Vec<Box<dyn LyricsProvider>>, ProviderError> {
    Ok(vec![
        Box::new(GeniusProvider::new(config.genius_api_token.clone(), config.timeout())?),
        Box::new(LyricsOvhProvider::new(config.timeout())?),
    ])
}
