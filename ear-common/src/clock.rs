//! Time sources
//!
//! Cooldowns, reconnect backoff and heartbeat cadence all read time through
//! [`Clock`] so they can be driven deterministically in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Injectable monotonic + wall-clock time source
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for intervals and cooldowns
    fn now(&self) -> Instant;

    /// Wall-clock time, used for timestamps in persisted records
    fn utc_now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real time backed by `std::time` and `tokio::time`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual time for tests.
///
/// `sleep` returns immediately after advancing the clock by the requested
/// duration and recording it, so backoff schedules can be asserted exactly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    inner: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            inner: Mutex::new(ManualState::default()),
        }
    }

    /// Move virtual time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        state.elapsed += by;
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).elapsed
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .sleeps
            .clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            state.elapsed += duration;
            state.sleeps.push(duration);
        }
        // Let other tasks observe the new time before the caller resumes
        tokio::task::yield_now().await;
    }
}
