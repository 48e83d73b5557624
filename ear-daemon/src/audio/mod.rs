//! Audio capture and buffering
//!
//! - `ring_buffer`: fixed-capacity sample store shared with the capture callback
//! - `capture`: device/session traits and the cpal backend
//! - `mock`: scriptable capture device for tests and dry runs
//! - `wav`: in-memory WAV encoding for recognition uploads

pub mod capture;
pub mod mock;
pub mod ring_buffer;
pub mod wav;

pub use capture::{
    find_monitor_source, list_input_devices, CaptureDevice, CaptureSession, CaptureSpec,
    CpalCaptureDevice,
};
pub use mock::{MockCaptureDevice, MockOpen};
pub use ring_buffer::RingBuffer;
pub use wav::encode_wav;
