//! Recognized track record shared by recognition, lyrics and feedback

use serde::{Deserialize, Serialize};

/// Provider id used for tracks entered by a human
pub const MANUAL_SOURCE: &str = "manual_correction";

/// A track identified by an external provider or a human correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedTrack {
    /// Provider id (e.g. "audd", "shazam", "manual_correction")
    pub source: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

impl RecognizedTrack {
    pub fn new(source: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            release_date: None,
            lyrics: None,
            external_url: None,
        }
    }

    /// Track entered through the manual correction entrypoint
    pub fn manual(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self::new(MANUAL_SOURCE, title, artist)
    }

    /// De-duplication key: (title, artist), case-insensitive
    pub fn identity_key(&self) -> (String, String) {
        (
            self.title.trim().to_lowercase(),
            self.artist.trim().to_lowercase(),
        )
    }

    /// True when both tracks refer to the same piece of audio
    pub fn same_identity(&self, other: &RecognizedTrack) -> bool {
        self.identity_key() == other.identity_key()
    }

    /// A match is usable only when both title and artist are present
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.artist.trim().is_empty()
    }

    /// Lyrics already delivered by the recognition provider, if non-empty
    pub fn embedded_lyrics(&self) -> Option<&str> {
        self.lyrics.as_deref().filter(|l| !l.trim().is_empty())
    }
}
