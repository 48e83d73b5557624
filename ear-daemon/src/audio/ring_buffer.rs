//! Shared sample store between the capture callback and the analysis loop
//!
//! The capture callback writes fixed-size blocks; the analysis loop copies
//! out the most recent window. Both sides go through one mutex that is held
//! only for the memory copy. Writes never block on readers for longer than a
//! copy and never apply back-pressure: once full, the oldest samples are
//! overwritten.

use ringbuf::{traits::*, HeapRb};
// The local `RingBuffer` shadows the glob-imported trait of the same name
use ringbuf::traits::RingBuffer as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Fixed-capacity mono sample ring
pub struct RingBuffer {
    inner: Mutex<HeapRb<f32>>,
    sample_rate: u32,
    capacity: usize,
    /// Monotonic write cursor: total samples ever written
    written: AtomicU64,
}

impl RingBuffer {
    /// Create a ring holding `seconds` of audio at `sample_rate`
    pub fn new(sample_rate: u32, seconds: u32) -> Self {
        let capacity = (sample_rate as usize * seconds as usize).max(1);

        debug!(
            "Creating sample ring: {} samples ({}s @ {}Hz)",
            capacity, seconds, sample_rate
        );

        Self {
            inner: Mutex::new(HeapRb::new(capacity)),
            sample_rate,
            capacity,
            written: AtomicU64::new(0),
        }
    }

    /// Copy a block in, overwriting the oldest samples once full.
    ///
    /// Safe to call from the real-time capture callback: no allocation, and
    /// the lock is held only for the copy.
    pub fn write(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        {
            let mut ring = self.lock();
            ring.push_slice_overwrite(samples);
        }
        self.written.fetch_add(samples.len() as u64, Ordering::Release);
    }

    /// Fresh copy of the most recent `seconds` of audio, oldest sample first.
    ///
    /// Always returns exactly `seconds * sample_rate` samples. Any part of
    /// the window not covered by written data is silence (zeros) at the
    /// start of the result.
    pub fn read_last(&self, seconds: f64) -> Vec<f32> {
        let wanted = self.samples_for(seconds);
        let mut out = vec![0.0f32; wanted];

        let ring = self.lock();
        let (head, tail) = ring.as_slices();
        let available = head.len() + tail.len();
        let take = wanted.min(available);
        let skip = available - take;
        let dst = &mut out[wanted - take..];

        if skip < head.len() {
            let head_part = &head[skip..];
            dst[..head_part.len()].copy_from_slice(head_part);
            dst[head_part.len()..].copy_from_slice(tail);
        } else {
            dst.copy_from_slice(&tail[skip - head.len()..]);
        }
        drop(ring);

        out
    }

    /// Number of samples a window of `seconds` spans
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }

    /// Total samples written since creation
    pub fn total_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Current write position within the backing array
    pub fn cursor(&self) -> usize {
        (self.total_written() % self.capacity as u64) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio the ring can hold
    pub fn capacity_seconds(&self) -> f64 {
        self.capacity as f64 / self.sample_rate as f64
    }

    fn lock(&self) -> MutexGuard<'_, HeapRb<f32>> {
        // A panic while holding the lock cannot leave the ring inconsistent
        // (copies only), so poisoning is ignored.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_read_before_any_write_is_silence() {
        let ring = RingBuffer::new(10, 3);
        let out = ring.read_last(2.0);
        assert_eq!(out, vec![0.0; 20]);
    }

    #[test]
    fn test_partial_fill_zero_prefix() {
        let ring = RingBuffer::new(10, 3);
        ring.write(&ramp(1, 5));

        let out = ring.read_last(1.0);
        assert_eq!(out.len(), 10);
        assert_eq!(&out[..5], &[0.0; 5]);
        assert_eq!(&out[5..], &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_exact_last_samples_without_wrap() {
        let ring = RingBuffer::new(10, 3);
        ring.write(&ramp(0, 25));

        let out = ring.read_last(1.0);
        assert_eq!(out, ramp(15, 10));
    }

    #[test]
    fn test_wraparound_keeps_chronological_order() {
        let ring = RingBuffer::new(10, 3); // capacity 30
        for block in 0..7 {
            ring.write(&ramp(block * 7, 7)); // 49 samples total, wraps once
        }

        assert_eq!(ring.total_written(), 49);
        assert_eq!(ring.cursor(), 19);
        assert_eq!(ring.read_last(2.0), ramp(29, 20));
        assert_eq!(ring.read_last(3.0), ramp(19, 30));
    }

    #[test]
    fn test_block_larger_than_capacity() {
        let ring = RingBuffer::new(4, 2); // capacity 8
        ring.write(&ramp(0, 19));
        assert_eq!(ring.read_last(2.0), ramp(11, 8));
    }

    #[test]
    fn test_many_random_block_sizes_match_reference() {
        let ring = RingBuffer::new(100, 2); // capacity 200
        let mut reference: Vec<f32> = Vec::new();
        let mut next = 0usize;

        // Deterministic pseudo-random block sizes
        let mut seed = 12345u32;
        for _ in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let len = (seed >> 16) as usize % 37 + 1;
            let block = ramp(next, len);
            next += len;
            ring.write(&block);
            reference.extend_from_slice(&block);

            let out = ring.read_last(1.5);
            let want = 150usize;
            if reference.len() >= want {
                assert_eq!(out, reference[reference.len() - want..].to_vec());
            } else {
                assert_eq!(out.len(), want);
                let pad = want - reference.len();
                assert!(out[..pad].iter().all(|s| *s == 0.0));
                assert_eq!(&out[pad..], &reference[..]);
            }
        }
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        use std::sync::Arc;

        let ring = Arc::new(RingBuffer::new(1000, 2));
        let writer_ring = Arc::clone(&ring);

        let writer = std::thread::spawn(move || {
            for block in 0..500 {
                writer_ring.write(&vec![block as f32; 100]);
            }
        });

        for _ in 0..200 {
            let out = ring.read_last(1.0);
            assert_eq!(out.len(), 1000);
            // Blocks are written whole, so values never decrease within a read
            assert!(out.windows(2).all(|w| w[0] <= w[1]));
        }

        writer.join().unwrap();
        assert_eq!(ring.total_written(), 50_000);
    }
}
