//! # Ambient listening daemon (ear-daemon)
//!
//! Captures a live audio stream indefinitely, extracts perceptual features
//! every tick, identifies the playing track through external services,
//! attaches lyrics, and learns from manual corrections.
//!
//! **Architecture:** a cpal capture thread writes into a [`audio::RingBuffer`];
//! a single cooperative loop owned by [`supervisor::Supervisor`] reads the
//! last window, analyses it, and emits [`ear_common::EarEvent`]s to a JSONL log
//! and the in-process bus.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod feedback;
pub mod http;
pub mod lyrics;
pub mod recognition;
pub mod supervisor;

pub use config::{DataPaths, EarConfig};
pub use error::{Error, Result};
pub use supervisor::{Supervisor, SupervisorState};
