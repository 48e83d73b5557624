//! Song identification through external services
//!
//! Each provider adapter owns its wire format and normalises the response
//! into a [`RecognizedTrack`]. The [`RecognitionChain`] applies the cooldown,
//! priority order and per-call timeout.

pub mod audd;
pub mod chain;
pub mod shazam;

pub use audd::AuddProvider;
pub use chain::RecognitionChain;
pub use shazam::ShazamProvider;

use crate::config::RecognitionConfig;
use crate::http::ProviderError;
use async_trait::async_trait;
use ear_common::RecognizedTrack;

#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Stable provider id, also used as `RecognizedTrack::source`
    fn id(&self) -> &str;

    /// False when no credential is configured; the chain then skips it
    fn is_configured(&self) -> bool;

    /// Identify a WAV-encoded clip. `Ok(None)` means "no match".
    async fn identify(&self, wav: &[u8]) -> Result<Option<RecognizedTrack>, ProviderError>;
}

/// Providers in priority order: AudD, then Shazam
pub fn default_providers(
    config: &RecognitionConfig,
) -> Result<Vec<Box<dyn RecognitionProvider>>, ProviderError> {
    Ok(vec![
        Box::new(AuddProvider::new(config.audd_api_token.clone(), config.timeout())?),
        Box::new(ShazamProvider::new(config.shazam_api_key.clone(), config.timeout())?),
    ])
}
