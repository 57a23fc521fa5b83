// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Highpass and lowpass biquads for the live signal chain.
//!
//! Transposed direct form II with RBJ cookbook coefficients. Retuning a filter
//! keeps its state so a running chain doesn't click when the cutoff moves.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Lowest cutoff frequency accepted.
pub const MIN_CUTOFF_HZ: f32 = 10.0;

/// Cutoffs are kept below this fraction of the sample rate.
const MAX_CUTOFF_RATIO: f64 = 0.49;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    fn passthrough() -> Coefficients {
        Coefficients {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    fn design(kind: FilterKind, cutoff_hz: f64, sample_rate: f64) -> Coefficients {
        if sample_rate <= 0.0 || !cutoff_hz.is_finite() {
            return Coefficients::passthrough();
        }
        let cutoff_hz = cutoff_hz.clamp(MIN_CUTOFF_HZ as f64, sample_rate * MAX_CUTOFF_RATIO);
        let omega = 2.0 * PI * cutoff_hz / sample_rate;
        let sin_w = omega.sin();
        let cos_w = omega.cos();
        let alpha = sin_w / (2.0 * FRAC_1_SQRT_2);
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match kind {
            FilterKind::Lowpass => ((1.0 - cos_w) / 2.0, 1.0 - cos_w, (1.0 - cos_w) / 2.0),
            FilterKind::Highpass => ((1.0 + cos_w) / 2.0, -(1.0 + cos_w), (1.0 + cos_w) / 2.0),
        };

        Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: (-2.0 * cos_w) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// A multi-channel biquad with one delay line per channel.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    sample_rate: f64,
    coefficients: Coefficients,
    state: Vec<[f64; 2]>,
}

impl Biquad {
    pub fn new(kind: FilterKind, cutoff_hz: f32, sample_rate: u32, channels: usize) -> Biquad {
        let sample_rate = sample_rate as f64;
        Biquad {
            kind,
            sample_rate,
            coefficients: Coefficients::design(kind, cutoff_hz as f64, sample_rate),
            state: vec![[0.0; 2]; channels.max(1)],
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Retunes the filter without touching its delay lines.
    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.coefficients = Coefficients::design(self.kind, cutoff_hz as f64, self.sample_rate);
    }

    /// Filters one sample on the given channel.
    #[inline]
    pub fn process(&mut self, channel: usize, input: f32) -> f32 {
        let c = &self.coefficients;
        let z = &mut self.state[channel];
        let input = input as f64;
        let output = c.b0 * input + z[0];
        z[0] = c.b1 * input - c.a1 * output + z[1];
        z[1] = c.b2 * input - c.a2 * output;

        // Flush denormals.
        if z[0].abs() < 1e-30 {
            z[0] = 0.0;
        }
        if z[1].abs() < 1e-30 {
            z[1] = 0.0;
        }
        output as f32
    }

    /// Clears the delay lines.
    pub fn reset(&mut self) {
        for z in self.state.iter_mut() {
            *z = [0.0; 2];
        }
    }
}

/// The highpass then lowpass pair inserted between source and gain.
#[derive(Debug, Clone)]
pub struct FilterPair {
    highpass: Biquad,
    lowpass: Biquad,
}

impl FilterPair {
    pub fn new(highpass_hz: f32, lowpass_hz: f32, sample_rate: u32, channels: usize) -> FilterPair {
        FilterPair {
            highpass: Biquad::new(FilterKind::Highpass, highpass_hz, sample_rate, channels),
            lowpass: Biquad::new(FilterKind::Lowpass, lowpass_hz, sample_rate, channels),
        }
    }

    pub fn set_cutoffs(&mut self, highpass_hz: f32, lowpass_hz: f32) {
        self.highpass.set_cutoff(highpass_hz);
        self.lowpass.set_cutoff(lowpass_hz);
    }

    #[inline]
    pub fn process(&mut self, channel: usize, input: f32) -> f32 {
        let highpassed = self.highpass.process(channel, input);
        self.lowpass.process(channel, highpassed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{rms, sine_wave};

    const RATE: u32 = 44100;

    fn filtered_rms(filter: &mut Biquad, signal: &[f32]) -> f32 {
        let out: Vec<f32> = signal.iter().map(|s| filter.process(0, *s)).collect();
        // Skip the settling time.
        rms(&out[out.len() / 2..])
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let mut filter = Biquad::new(FilterKind::Lowpass, 200.0, RATE, 1);
        let high = sine_wave(5000.0, RATE, 0.2);
        let low = sine_wave(50.0, RATE, 0.2);
        assert!(filtered_rms(&mut filter, &high) < 0.01);
        filter.reset();
        assert!(filtered_rms(&mut filter, &low) > 0.5);
    }

    #[test]
    fn test_highpass_attenuates_lows() {
        let mut filter = Biquad::new(FilterKind::Highpass, 2000.0, RATE, 1);
        let low = sine_wave(60.0, RATE, 0.2);
        let high = sine_wave(10000.0, RATE, 0.2);
        assert!(filtered_rms(&mut filter, &low) < 0.01);
        filter.reset();
        assert!(filtered_rms(&mut filter, &high) > 0.5);
    }

    #[test]
    fn test_retune_keeps_state() {
        let mut filter = Biquad::new(FilterKind::Lowpass, 1000.0, RATE, 1);
        let mut last = 0.0;
        for _ in 0..2000 {
            last = filter.process(0, 1.0);
        }
        filter.set_cutoff(1200.0);
        let next = filter.process(0, 1.0);
        // A DC input stays near unity through a retune.
        assert!((next - last).abs() < 0.05);
        assert_eq!(FilterKind::Lowpass, filter.kind());
    }

    #[test]
    fn test_extreme_cutoffs_stay_finite() {
        for cutoff in [0.0, -5.0, 1e9, f32::NAN] {
            let mut pair = FilterPair::new(cutoff, cutoff, RATE, 2);
            for s in sine_wave(440.0, RATE, 0.05) {
                assert!(pair.process(1, s).is_finite());
            }
        }
    }

    #[test]
    fn test_wide_open_pair_passes_midrange() {
        let mut pair = FilterPair::new(20.0, 20000.0, RATE, 1);
        let signal = sine_wave(1000.0, RATE, 0.2);
        let out: Vec<f32> = signal.iter().map(|s| pair.process(0, *s)).collect();
        let ratio = rms(&out[out.len() / 2..]) / rms(&signal[signal.len() / 2..]);
        assert!((ratio - 1.0).abs() < 0.05);
        pair.set_cutoffs(20.0, 200.0);
    }
}
