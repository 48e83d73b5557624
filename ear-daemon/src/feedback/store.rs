//! Append-only feedback store
//!
//! One JSON object per line in `feedback_history.jsonl`. The file is loaded
//! fully into memory at startup and only ever appended to afterwards.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ear_common::{FeatureRecord, RecognizedTrack};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Band ratio difference counted as "close"
const RATIO_TOLERANCE: f64 = 0.1;
/// BPM difference counted as "close"
const BPM_TOLERANCE: f64 = 10.0;
/// Minimum score for an entry to count as similar
const SIMILARITY_THRESHOLD: u32 = 2;

/// One recorded correction; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub timestamp: DateTime<Utc>,
    /// Short hash of the samples the features came from
    pub audio_fingerprint: String,
    pub features: FeatureRecord,
    /// What the pipeline believed was playing, if anything
    pub recognized: Option<RecognizedTrack>,
    pub correct: RecognizedTrack,
}

/// Line format on disk; the tag leaves room for other record kinds
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FeedbackLine {
    Correction(FeedbackEntry),
}

/// Integer similarity: +1 bass ratio close, +1 mid ratio close, +2 BPM close
pub fn similarity_score(query: &FeatureRecord, stored: &FeatureRecord) -> u32 {
    let mut score = 0;
    if (query.band_ratios.bass - stored.band_ratios.bass).abs() < RATIO_TOLERANCE {
        score += 1;
    }
    if (query.band_ratios.mid - stored.band_ratios.mid).abs() < RATIO_TOLERANCE {
        score += 1;
    }
    if (query.estimated_bpm - stored.estimated_bpm).abs() < BPM_TOLERANCE {
        score += 2;
    }
    score
}

pub struct FeedbackStore {
    path: PathBuf,
    /// In recording order, oldest first
    entries: Vec<FeedbackEntry>,
}

impl FeedbackStore {
    /// Load the history at `path`. A missing file is an empty history;
    /// lines that do not parse are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut entries = Vec::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FeedbackLine>(line) {
                    Ok(FeedbackLine::Correction(entry)) => entries.push(entry),
                    Err(e) => warn!(
                        "Skipping malformed feedback line {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    ),
                }
            }
            info!("Loaded {} corrections from {}", entries.len(), path.display());
        } else {
            debug!("No feedback history at {}", path.display());
        }

        Ok(Self { path, entries })
    }

    /// Append a correction.
    ///
    /// The entry joins the in-memory index before the file write, so a
    /// failed write (returned as `Error::Persistence`) still leaves it
    /// available to `suggest` for this process lifetime.
    pub fn record_correction(
        &mut self,
        features: FeatureRecord,
        recognized: Option<RecognizedTrack>,
        correct: RecognizedTrack,
        fingerprint: impl Into<String>,
    ) -> Result<FeedbackEntry> {
        let entry = FeedbackEntry {
            timestamp: Utc::now(),
            audio_fingerprint: fingerprint.into(),
            features,
            recognized,
            correct,
        };
        self.entries.push(entry.clone());

        self.append(&entry).map_err(|e| {
            Error::Persistence(format!("Feedback write to {} failed: {}", self.path.display(), e))
        })?;

        info!(
            recognized = ?entry.recognized.as_ref().map(|t| t.title.as_str()),
            "Recorded correction: {} - {}", entry.correct.artist, entry.correct.title
        );
        Ok(entry)
    }

    fn append(&self, entry: &FeedbackEntry) -> Result<()> {
        let mut line = serde_json::to_string(&FeedbackLine::Correction(entry.clone()))?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Entries scoring at least 2 against `features`, oldest first
    pub fn similar(&self, features: &FeatureRecord) -> Vec<&FeedbackEntry> {
        self.entries
            .iter()
            .filter(|e| similarity_score(features, &e.features) >= SIMILARITY_THRESHOLD)
            .collect()
    }

    /// Correct track of the most recently recorded similar entry.
    ///
    /// Recency, not score, picks among similar entries.
    pub fn suggest(&self, features: &FeatureRecord) -> Option<RecognizedTrack> {
        self.similar(features).last().map(|e| e.correct.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
