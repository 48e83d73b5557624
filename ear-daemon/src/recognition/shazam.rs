//! Shazam (RapidAPI) recognition adapter
//!
//! The detect endpoint takes the WAV clip base64-encoded as a plain-text body.

use super::RecognitionProvider;
use crate::http::{check_status, ProviderClient, ProviderError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ear_common::RecognizedTrack;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SHAZAM_URL: &str = "https://shazam.p.rapidapi.com/songs/detect";
const SHAZAM_HOST: &str = "shazam.p.rapidapi.com";
pub const SHAZAM_ID: &str = "shazam";

#[derive(Debug, Deserialize)]
pub struct ShazamResponse {
    pub track: Option<ShazamTrack>,
}

#[derive(Debug, Deserialize)]
pub struct ShazamTrack {
    pub title: Option<String>,
    /// Shazam puts the artist in the subtitle
    pub subtitle: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub sections: Vec<ShazamSection>,
}

#[derive(Debug, Deserialize)]
pub struct ShazamSection {
    #[serde(default)]
    pub metadata: Vec<ShazamMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct ShazamMetadata {
    pub title: Option<String>,
    pub text: Option<String>,
}

impl ShazamResponse {
    pub fn into_track(self) -> Option<RecognizedTrack> {
        let track = self.track?;
        let mut recognized = RecognizedTrack::new(SHAZAM_ID, track.title?, track.subtitle?);

        // First metadata entry of the first section is the album
        recognized.album = track
            .sections
            .first()
            .and_then(|s| s.metadata.first())
            .and_then(|m| m.text.clone());
        recognized.external_url = track.url;
        Some(recognized)
    }
}

pub struct ShazamProvider {
    http_client: ProviderClient,
    api_key: Option<String>,
    endpoint: String,
}

impl ShazamProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: ProviderClient::new(timeout)?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: SHAZAM_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl RecognitionProvider for ShazamProvider {
    fn id(&self) -> &str {
        SHAZAM_ID
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn identify(&self, wav: &[u8]) -> Result<Option<RecognizedTrack>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Api(401, "no Shazam key configured".to_string()))?;

        let body = STANDARD.encode(wav);
        debug!(bytes = body.len(), "Querying Shazam");

        let request = self
            .http_client
            .post(&self.endpoint)
            .header("X-RapidAPI-Key", key)
            .header("X-RapidAPI-Host", SHAZAM_HOST)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);
        let response = self.http_client.send(request).await?;
        let response = check_status(response).await?;

        // An empty body is Shazam's "no match"
        let text = response.text().await.map_err(|e| self.http_client.error(e))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let parsed: ShazamResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parsed.into_track())
    }
}
