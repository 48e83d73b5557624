//! Scriptable capture device
//!
//! Each `open` consumes the next scripted outcome (or the fallback once the
//! script is exhausted). A successful open writes the configured signal into
//! the ring buffer, so the first tick already sees a full window.

use crate::audio::capture::{CaptureDevice, CaptureSession, CaptureSpec};
use crate::audio::RingBuffer;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Outcome of one `open` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOpen {
    /// Open fails with a device error
    Fail,
    /// Session stays healthy until closed
    Healthy,
    /// Session reports itself lost on the Nth health check
    LostAfterChecks(u32),
}

pub struct MockCaptureDevice {
    name: String,
    signal: Vec<f32>,
    script: Mutex<VecDeque<MockOpen>>,
    fallback: MockOpen,
    opens: AtomicU32,
    stop_after: Option<(u32, CancellationToken)>,
}

impl MockCaptureDevice {
    /// Healthy device feeding silence
    pub fn new() -> Self {
        Self {
            name: "mock-input".to_string(),
            signal: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            fallback: MockOpen::Healthy,
            opens: AtomicU32::new(0),
            stop_after: None,
        }
    }

    /// Samples written into the ring on every successful open
    pub fn with_signal(mut self, signal: Vec<f32>) -> Self {
        self.signal = signal;
        self
    }

    /// Queue the outcome of the next open
    pub fn then(self, outcome: MockOpen) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(outcome);
        self
    }

    /// Outcome once the script is exhausted
    pub fn otherwise(mut self, outcome: MockOpen) -> Self {
        self.fallback = outcome;
        self
    }

    /// Cancel `token` when the `opens`th open is attempted
    pub fn stop_after_opens(mut self, opens: u32, token: CancellationToken) -> Self {
        self.stop_after = Some((opens, token));
        self
    }

    /// Number of open attempts so far
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Default for MockCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn open(&self, _spec: &CaptureSpec, sink: Arc<RingBuffer>) -> Result<Box<dyn CaptureSession>> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.stop_after {
            if attempt >= *limit {
                token.cancel();
            }
        }

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or(self.fallback);

        let checks_left = match outcome {
            MockOpen::Fail => {
                return Err(Error::Device(format!("{}: open attempt {} failed", self.name, attempt)));
            }
            MockOpen::Healthy => None,
            MockOpen::LostAfterChecks(n) => Some(AtomicU32::new(n)),
        };

        sink.write(&self.signal);

        Ok(Box::new(MockSession {
            name: self.name.clone(),
            checks_left,
        }))
    }
}

struct MockSession {
    name: String,
    checks_left: Option<AtomicU32>,
}

impl CaptureSession for MockSession {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        let Some(left) = &self.checks_left else {
            return Ok(());
        };

        let remaining = left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if remaining <= 1 {
            return Err(Error::Device(format!("{}: stream lost", self.name)));
        }
        Ok(())
    }

    fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CaptureSpec {
        CaptureSpec {
            sample_rate: 10,
            channels: 1,
            block_samples: 1,
            device: None,
        }
    }

    #[test]
    fn test_script_then_fallback() {
        let device = MockCaptureDevice::new()
            .then(MockOpen::Fail)
            .then(MockOpen::Fail)
            .otherwise(MockOpen::Healthy);
        let ring = Arc::new(RingBuffer::new(10, 1));

        assert!(device.open(&spec(), Arc::clone(&ring)).is_err());
        assert!(device.open(&spec(), Arc::clone(&ring)).is_err());
        let session = device.open(&spec(), ring).unwrap();
        assert!(session.check().is_ok());
        assert_eq!(device.open_count(), 3);
    }

    #[test]
    fn test_session_lost_after_checks() {
        let device = MockCaptureDevice::new().then(MockOpen::LostAfterChecks(2));
        let session = device.open(&spec(), Arc::new(RingBuffer::new(10, 1))).unwrap();

        assert!(session.check().is_ok());
        assert!(matches!(session.check(), Err(Error::Device(_))));
        assert!(session.check().is_err());
    }

    #[test]
    fn test_open_feeds_signal_and_requests_stop() {
        let token = CancellationToken::new();
        let device = MockCaptureDevice::new()
            .with_signal(vec![0.5; 7])
            .stop_after_opens(1, token.clone());
        let ring = Arc::new(RingBuffer::new(10, 1));

        let _session = device.open(&spec(), Arc::clone(&ring)).unwrap();
        assert!(token.is_cancelled());
        assert_eq!(ring.total_written(), 7);
    }
}
