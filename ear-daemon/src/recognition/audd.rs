//! AudD recognition adapter
//!
//! Multipart upload of the WAV clip. Asking for `lyrics,spotify` makes AudD
//! return lyric text and a Spotify link alongside the match, which lets the
//! lyric chain be skipped entirely.

use super::RecognitionProvider;
use crate::http::{check_status, ProviderClient, ProviderError};
use async_trait::async_trait;
use ear_common::RecognizedTrack;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const AUDD_URL: &str = "https://api.audd.io/";
pub const AUDD_ID: &str = "audd";

#[derive(Debug, Deserialize)]
pub struct AuddResponse {
    pub status: String,
    pub result: Option<AuddResult>,
    pub error: Option<AuddError>,
}

#[derive(Debug, Deserialize)]
pub struct AuddError {
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuddResult {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub lyrics: Option<AuddLyrics>,
    pub spotify: Option<AuddSpotify>,
}

#[derive(Debug, Deserialize)]
pub struct AuddLyrics {
    pub lyrics: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuddSpotify {
    pub external_urls: Option<SpotifyUrls>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyUrls {
    pub spotify: Option<String>,
}

impl AuddResponse {
    /// Normalise to a track; `Ok(None)` when AudD found nothing
    pub fn into_track(self) -> Result<Option<RecognizedTrack>, ProviderError> {
        if self.status != "success" {
            let message = self
                .error
                .map(|e| {
                    format!(
                        "code {}: {}",
                        e.error_code.unwrap_or_default(),
                        e.error_message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| self.status.clone());
            return Err(ProviderError::Api(200, message));
        }

        let Some(result) = self.result else {
            return Ok(None);
        };
        let (Some(title), Some(artist)) = (result.title, result.artist) else {
            return Ok(None);
        };

        let mut track = RecognizedTrack::new(AUDD_ID, title, artist);
        track.album = result.album;
        track.release_date = result.release_date;
        track.lyrics = result.lyrics.and_then(|l| l.lyrics);
        track.external_url = result
            .spotify
            .and_then(|s| s.external_urls)
            .and_then(|u| u.spotify);
        Ok(Some(track))
    }
}

pub struct AuddProvider {
    http_client: ProviderClient,
    api_token: Option<String>,
    endpoint: String,
}

impl AuddProvider {
    pub fn new(api_token: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: ProviderClient::new(timeout)?,
            api_token: api_token.filter(|t| !t.trim().is_empty()),
            endpoint: AUDD_URL.to_string(),
        })
    }

    /// Point at another endpoint (staging, local proxy)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl RecognitionProvider for AuddProvider {
    fn id(&self) -> &str {
        AUDD_ID
    }

    fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    async fn identify(&self, wav: &[u8]) -> Result<Option<RecognizedTrack>, ProviderError> {
        let token = self
            .api_token
            .clone()
            .ok_or_else(|| ProviderError::Api(401, "no AudD token configured".to_string()))?;

        let file = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::Encode(e.to_string()))?;

        let form = Form::new()
            .text("api_token", token)
            .part("file", file)
            .text("return", "lyrics,spotify");

        debug!(bytes = wav.len(), "Querying AudD");

        let response = self
            .http_client
            .send(self.http_client.post(&self.endpoint).multipart(form))
            .await?;
        let response = check_status(response).await?;
        let body: AuddResponse = response.json().await.map_err(|e| self.http_client.error(e))?;

        body.into_track()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Option<RecognizedTrack>, ProviderError> {
        serde_json::from_str::<AuddResponse>(json).unwrap().into_track()
    }

    #[test]
    fn test_full_match_normalised() {
        let track = parse(
            r#"{
                "status": "success",
                "result": {
                    "artist": "Daft Punk",
                    "title": "Around the World",
                    "album": "Homework",
                    "release_date": "1997-01-20",
                    "lyrics": {"lyrics": "Around the world, around the world"},
                    "spotify": {"external_urls": {"spotify": "https://open.spotify.com/track/x"}}
                }
            }"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(track.source, "audd");
        assert_eq!(track.title, "Around the World");
        assert_eq!(track.album.as_deref(), Some("Homework"));
        assert!(track.embedded_lyrics().is_some());
        assert_eq!(track.external_url.as_deref(), Some("https://open.spotify.com/track/x"));
    }

    #[test]
    fn test_no_match_is_none() {
        assert!(parse(r#"{"status": "success", "result": null}"#).unwrap().is_none());
    }

    #[test]
    fn test_missing_artist_is_none() {
        assert!(parse(r#"{"status": "success", "result": {"title": "Only Title"}}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_error_status_is_api_error() {
        let err = parse(
            r#"{"status": "error", "error": {"error_code": 900, "error_message": "Recognition failed"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Api(_, msg) if msg.contains("900")));
    }

    #[test]
    fn test_blank_token_is_unconfigured() {
        let provider = AuddProvider::new(Some("  ".to_string()), Duration::from_secs(1)).unwrap();
        assert!(!provider.is_configured());
    }
}
