//! Deterministic test signals

use std::f32::consts::PI;

pub fn silence(sample_rate: u32, seconds: f32) -> Vec<f32> {
    vec![0.0; (sample_rate as f32 * seconds) as usize]
}

pub fn sine(freq: f32, amplitude: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let n = (sample_rate as f32 * seconds) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Bass tone gated on for `pulse_ms` at the start of every beat.
///
/// 174 Hz at 2 pulses per second is a 120 BPM bass line.
pub fn bass_pulse_train(
    freq: f32,
    amplitude: f32,
    pulses_per_second: f32,
    pulse_ms: f32,
    sample_rate: u32,
    seconds: f32,
) -> Vec<f32> {
    let period = (sample_rate as f32 / pulses_per_second) as usize;
    let width = (sample_rate as f32 * pulse_ms / 1000.0) as usize;

    sine(freq, amplitude, sample_rate, seconds)
        .into_iter()
        .enumerate()
        .map(|(i, s)| if i % period < width { s } else { 0.0 })
        .collect()
}
