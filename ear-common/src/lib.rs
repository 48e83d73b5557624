//! # Ear Common Library
//!
//! Shared code for the ambient listening daemon and anything that consumes
//! its output:
//! - Event types (`EarEvent`) and the in-process `EventBus`
//! - Feature, track and heartbeat records
//! - Configuration and root folder resolution
//! - Injectable clock for time-dependent logic

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod heartbeat;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use events::{BandRatios, EarEvent, EventBus, FeatureRecord, RecognizedTrack};
pub use heartbeat::HeartbeatState;
