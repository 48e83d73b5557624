//! Audio capture sessions
//!
//! The supervisor only sees the [`CaptureDevice`] / [`CaptureSession`]
//! traits. The cpal backend runs the stream on a dedicated thread whose
//! callback does nothing but downmix and `RingBuffer::write`.

use crate::audio::RingBuffer;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long `open` waits for the capture thread to report success
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Name fragments identifying a system-audio monitor source
const MONITOR_HINTS: [&str; 3] = ["pipewire", "pulse", "monitor"];

/// What to open
#[derive(Debug, Clone)]
pub struct CaptureSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per mono block
    pub block_samples: usize,
    /// Device name (None = default input)
    pub device: Option<String>,
}

/// Factory for capture sessions; one open session at a time
pub trait CaptureDevice: Send + Sync {
    /// Open a session that writes mono blocks into `sink` until closed
    fn open(&self, spec: &CaptureSpec, sink: Arc<RingBuffer>) -> Result<Box<dyn CaptureSession>>;
}

/// A running capture stream
pub trait CaptureSession: Send + Sync {
    fn device_name(&self) -> &str;

    /// `Err(Error::Device)` once the backend reported the stream lost
    fn check(&self) -> Result<()>;

    /// Stop the stream and release the device
    fn close(self: Box<Self>);
}

/// Error state shared with the stream's error callback
#[derive(Default)]
struct SessionHealth {
    failed: AtomicBool,
    error_count: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl SessionHealth {
    fn record(&self, message: String) {
        self.failed.store(true, Ordering::SeqCst);
        self.error_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message);
        }
    }

    fn last_error(&self) -> String {
        self.last_error
            .lock()
            .ok()
            .and_then(|l| l.clone())
            .unwrap_or_else(|| "stream error".to_string())
    }
}

/// cpal-backed capture
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCaptureDevice;

impl CpalCaptureDevice {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn open(&self, spec: &CaptureSpec, sink: Arc<RingBuffer>) -> Result<Box<dyn CaptureSession>> {
        let health = Arc::new(SessionHealth::default());
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<String>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_spec = spec.clone();
        let thread_health = Arc::clone(&health);

        // cpal streams are not Send on every platform, so the stream lives
        // and dies on its own thread.
        let handle = std::thread::Builder::new()
            .name("ear-capture".to_string())
            .spawn(move || {
                let stream = match start_stream(&thread_spec, sink, Arc::clone(&thread_health)) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until close() sends or the session is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture thread exiting");
            })?;

        let device_name = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = stop_tx.send(());
                return Err(Error::Device("Timed out opening capture stream".to_string()));
            }
        };

        info!("Capture session open on {}", device_name);

        Ok(Box::new(CpalSession {
            device_name,
            health,
            stop_tx,
            handle: Some(handle),
        }))
    }
}

struct CpalSession {
    device_name: String,
    health: Arc<SessionHealth>,
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureSession for CpalSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn check(&self) -> Result<()> {
        if self.health.failed.load(Ordering::SeqCst) {
            return Err(Error::Device(self.health.last_error()));
        }
        if self.handle.as_ref().map_or(true, |h| h.is_finished()) {
            return Err(Error::Device("Capture thread exited".to_string()));
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Capture thread panicked during shutdown");
            }
        }
        info!(
            errors = self.health.error_count.load(Ordering::SeqCst),
            "Capture session closed on {}", self.device_name
        );
    }
}

/// Runs on the capture thread
fn start_stream(
    spec: &CaptureSpec,
    sink: Arc<RingBuffer>,
    health: Arc<SessionHealth>,
) -> Result<(Stream, String)> {
    let host = cpal::default_host();
    let device = select_device(&host, spec.device.as_deref())?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (config, sample_format) = input_config(&device, spec.sample_rate, spec.channels)?;
    let fixed = u32::try_from(spec.block_samples).ok().map(cpal::BufferSize::Fixed);

    let stream = with_buffer_fallback(fixed, |buffer_size| {
        let config = StreamConfig {
            buffer_size,
            ..config.clone()
        };
        debug!(
            "Capture config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        let (sink, health) = (Arc::clone(&sink), Arc::clone(&health));
        match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, spec.block_samples, sink, health),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, spec.block_samples, sink, health),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, spec.block_samples, sink, health),
            other => Err(Error::Device(format!("Unsupported sample format: {:?}", other))),
        }
    })?;

    stream
        .play()
        .map_err(|e| Error::Device(format!("Failed to start stream: {}", e)))?;

    Ok((stream, name))
}

/// Try `build` with the preferred buffer size, then once more with the
/// device default if the device rejected it
fn with_buffer_fallback<T>(
    preferred: Option<cpal::BufferSize>,
    mut build: impl FnMut(cpal::BufferSize) -> Result<T>,
) -> Result<T> {
    let Some(preferred) = preferred else {
        return build(cpal::BufferSize::Default);
    };

    match build(preferred) {
        Ok(built) => Ok(built),
        Err(e) => {
            warn!("{} with buffer size {:?}, retrying with the device default", e, preferred);
            build(cpal::BufferSize::Default)
        }
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
    if let Some(name) = name {
        let mut devices = host
            .input_devices()
            .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(device);
        }
        warn!("Requested input '{}' not found, falling back to default input", name);
    }

    host.default_input_device()
        .ok_or_else(|| Error::Device("No default input device found".to_string()))
}

/// Pick a config running at exactly `sample_rate`, preferring f32 and the
/// requested channel count. Any channel count is accepted (downmixed later).
fn input_config(device: &Device, sample_rate: u32, channels: u16) -> Result<(StreamConfig, SampleFormat)> {
    let supported: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::Device(format!("Failed to get device configs: {}", e)))?
        .filter(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
        .collect();

    let rank = |c: &cpal::SupportedStreamConfigRange| {
        let format_rank = match c.sample_format() {
            SampleFormat::F32 => 0,
            SampleFormat::I16 => 1,
            SampleFormat::U16 => 2,
            _ => 3,
        };
        let channel_rank = if c.channels() == channels { 0 } else { 1 };
        (format_rank, channel_rank)
    };

    let best = supported
        .into_iter()
        .filter(|c| rank(c).0 < 3)
        .min_by_key(|c| rank(c))
        .ok_or_else(|| Error::Device(format!("Device does not support {} Hz capture", sample_rate)))?;

    let sample_format = best.sample_format();
    let config = best.with_sample_rate(cpal::SampleRate(sample_rate)).config();
    Ok((config, sample_format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    block_samples: usize,
    sink: Arc<RingBuffer>,
    health: Arc<SessionHealth>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    // Pre-sized so the callback does not allocate in steady state
    let mut mono: Vec<f32> = Vec::with_capacity(block_samples.max(1) * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                for frame in data.chunks(channels) {
                    let sum: f32 = frame.iter().map(|s| f32::from_sample_(*s)).sum();
                    mono.push(sum / frame.len() as f32);
                }
                sink.write(&mono);
            },
            move |err| {
                error!("Capture stream error: {} - marking session lost", err);
                health.record(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::Device(format!("Failed to build stream: {}", e)))
}

/// Names of all input devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices: Vec<String> = host
        .input_devices()
        .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} input devices", devices.len());
    Ok(devices)
}

/// First input device that looks like a system-audio monitor
pub fn find_monitor_source() -> Option<String> {
    list_input_devices()
        .ok()
        .and_then(|names| pick_monitor_source(&names))
}

/// Monitor selection over a list of device names, pipewire preferred
pub fn pick_monitor_source(names: &[String]) -> Option<String> {
    MONITOR_HINTS.iter().find_map(|hint| {
        names
            .iter()
            .find(|name| name.to_lowercase().contains(hint))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_fixed_buffer_retries_with_default() {
        let mut tried = Vec::new();
        let result = with_buffer_fallback(Some(cpal::BufferSize::Fixed(4410)), |size| {
            tried.push(size);
            match size {
                cpal::BufferSize::Fixed(_) => Err(Error::Device("unsupported buffer size".to_string())),
                cpal::BufferSize::Default => Ok("stream"),
            }
        });

        assert_eq!(result.unwrap(), "stream");
        assert_eq!(tried, vec![cpal::BufferSize::Fixed(4410), cpal::BufferSize::Default]);
    }

    #[test]
    fn test_buffer_fallback_reports_second_failure() {
        let mut attempts = 0;
        let result: Result<()> = with_buffer_fallback(Some(cpal::BufferSize::Fixed(512)), |_| {
            attempts += 1;
            Err(Error::Device(format!("attempt {}", attempts)))
        });

        assert!(matches!(result, Err(Error::Device(msg)) if msg == "attempt 2"));
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_no_preferred_size_builds_once_with_default() {
        let mut tried = Vec::new();
        with_buffer_fallback(None, |size| {
            tried.push(size);
            Ok(())
        })
        .unwrap();
        assert_eq!(tried, vec![cpal::BufferSize::Default]);
    }

    #[test]
    fn test_monitor_prefers_pipewire() {
        let names = vec![
            "HDA Intel PCH".to_string(),
            "pulse".to_string(),
            "PipeWire Sound Server".to_string(),
        ];
        assert_eq!(pick_monitor_source(&names).as_deref(), Some("PipeWire Sound Server"));
    }

    #[test]
    fn test_monitor_falls_back_to_monitor_suffix() {
        let names = vec![
            "Built-in Microphone".to_string(),
            "alsa_output.analog-stereo.monitor".to_string(),
        ];
        assert_eq!(
            pick_monitor_source(&names).as_deref(),
            Some("alsa_output.analog-stereo.monitor")
        );
    }

    #[test]
    fn test_no_monitor_found() {
        let names = vec!["Built-in Microphone".to_string()];
        assert!(pick_monitor_source(&names).is_none());
    }

    #[test]
    fn test_session_health_records_last_error() {
        let health = SessionHealth::default();
        assert!(!health.failed.load(Ordering::SeqCst));

        health.record("device unplugged".to_string());
        assert!(health.failed.load(Ordering::SeqCst));
        assert_eq!(health.last_error(), "device unplugged");
    }
}
