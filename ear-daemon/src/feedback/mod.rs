//! Correction history and similarity lookup
//!
//! Learning here means a growing case base of corrected outcomes: no model is
//! trained, past corrections are matched against new feature records.

pub mod store;

pub use store::{similarity_score, FeedbackEntry, FeedbackStore};
