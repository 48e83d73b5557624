//! Genius lyric adapter
//!
//! The Genius API only returns song metadata, so lyrics are scraped from the
//! song page: the text lives in `data-lyrics-container` blocks.

use super::LyricsProvider;
use crate::http::{check_status, ProviderClient, ProviderError};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const GENIUS_SEARCH_URL: &str = "https://api.genius.com/search";
pub const GENIUS_ID: &str = "genius";

#[derive(Debug, Deserialize)]
pub struct GeniusSearch {
    pub response: GeniusSearchBody,
}

#[derive(Debug, Deserialize)]
pub struct GeniusSearchBody {
    #[serde(default)]
    pub hits: Vec<GeniusHit>,
}

#[derive(Debug, Deserialize)]
pub struct GeniusHit {
    pub result: GeniusSong,
}

#[derive(Debug, Deserialize)]
pub struct GeniusSong {
    pub url: String,
}

impl GeniusSearch {
    /// Page URL of the top hit
    pub fn top_url(&self) -> Option<&str> {
        self.response.hits.first().map(|h| h.result.url.as_str())
    }
}

/// Compiled patterns for page scraping
pub struct LyricsScraper {
    container: Regex,
    tag: Regex,
    entity: Regex,
}

impl LyricsScraper {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            container: Regex::new(r#"(?s)data-lyrics-container="true"[^>]*>(.*?)</div>"#)?,
            tag: Regex::new(r"<[^>]+>")?,
            entity: Regex::new(r"&[^;]+;")?,
        })
    }

    /// Plain text of all lyric containers. Tags become line breaks and HTML
    /// entities are dropped.
    pub fn extract(&self, html: &str) -> Option<String> {
        let blocks: Vec<&str> = self
            .container
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if blocks.is_empty() {
            return None;
        }

        let joined = blocks.join(" ");
        let text = self.tag.replace_all(&joined, "\n");
        let text = self.entity.replace_all(&text, "");
        let text = text.trim();

        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

pub struct GeniusProvider {
    http_client: ProviderClient,
    api_token: Option<String>,
    scraper: LyricsScraper,
}

impl GeniusProvider {
    pub fn new(api_token: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let scraper = LyricsScraper::new().map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(Self {
            http_client: ProviderClient::new(timeout)?,
            api_token: api_token.filter(|t| !t.trim().is_empty()),
            scraper,
        })
    }
}

#[async_trait]
impl LyricsProvider for GeniusProvider {
    fn id(&self) -> &str {
        GENIUS_ID
    }

    fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    async fn fetch(&self, title: &str, artist: &str) -> Result<Option<String>, ProviderError> {
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| ProviderError::Api(401, "no Genius token configured".to_string()))?;

        let query = format!("{} {}", artist, title);
        debug!(query = %query, "Searching Genius");

        let request = self
            .http_client
            .get(GENIUS_SEARCH_URL)
            .bearer_auth(token)
            .query(&[("q", query.as_str())]);
        let response = self.http_client.send(request).await?;
        let search: GeniusSearch = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| self.http_client.error(e))?;

        let Some(url) = search.top_url() else {
            return Ok(None);
        };

        debug!(url = %url, "Scraping Genius page");
        let page = self.http_client.send(self.http_client.get(url)).await?;
        let html = check_status(page)
            .await?
            .text()
            .await
            .map_err(|e| self.http_client.error(e))?;

        Ok(self.scraper.extract(&html))
    }
}
