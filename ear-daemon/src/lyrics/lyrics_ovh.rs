//! lyrics.ovh adapter (no credential needed)

use super::LyricsProvider;
use crate::http::{check_status, ProviderClient, ProviderError};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const LYRICS_OVH_URL: &str = "https://api.lyrics.ovh/v1/";
pub const LYRICS_OVH_ID: &str = "lyrics_ovh";

#[derive(Debug, Deserialize)]
struct LyricsOvhResponse {
    lyrics: Option<String>,
}

pub struct LyricsOvhProvider {
    http_client: ProviderClient,
    base_url: String,
}

impl LyricsOvhProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: ProviderClient::new(timeout)?,
            base_url: LYRICS_OVH_URL.to_string(),
        })
    }

    /// `<base>/<artist>/<title>` with both segments percent-encoded
    pub fn lookup_url(&self, title: &str, artist: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ProviderError::Encode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Encode(format!("cannot append to {}", self.base_url)))?
            .pop_if_empty()
            .push(artist)
            .push(title);
        Ok(url)
    }
}

#[async_trait]
impl LyricsProvider for LyricsOvhProvider {
    fn id(&self) -> &str {
        LYRICS_OVH_ID
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch(&self, title: &str, artist: &str) -> Result<Option<String>, ProviderError> {
        let url = self.lookup_url(title, artist)?;
        let response = self.http_client.send(self.http_client.get(url)).await?;

        // lyrics.ovh answers "not found" with a 404
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: LyricsOvhResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| self.http_client.error(e))?;
        Ok(body.lyrics.filter(|l| !l.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_url_encodes_segments() {
        let provider = LyricsOvhProvider::new(Duration::from_secs(1)).unwrap();
        let url = provider.lookup_url("What's Up?", "4 Non Blondes").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.lyrics.ovh/v1/4%20Non%20Blondes/What's%20Up%3F"
        );
    }

    #[test]
    fn test_lookup_url_escapes_slashes() {
        let provider = LyricsOvhProvider::new(Duration::from_secs(1)).unwrap();
        let url = provider.lookup_url("Either/Or", "AC/DC").unwrap();
        assert_eq!(url.path(), "/v1/AC%2FDC/Either%2FOr");
    }
}
