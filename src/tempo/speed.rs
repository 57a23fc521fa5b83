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

//! Conversions between tempo and playback speed, plus tap tempo.

use std::collections::VecDeque;

use super::{MAX_TEMPO, MIN_TEMPO};

/// Slowest playback speed ratio.
pub const MIN_SPEED: f64 = 0.5;

/// Fastest playback speed ratio.
pub const MAX_SPEED: f64 = 2.0;

/// Number of taps kept in the rolling window.
const TAP_WINDOW: usize = 8;

/// A gap between taps longer than this discards the window.
const TAP_RESET_MS: f64 = 3000.0;

/// The speed ratio that plays a track at the target tempo.
pub fn speed_ratio(target_tempo: f64, track_tempo: f64) -> f64 {
    target_tempo / track_tempo
}

/// The audible tempo of a track played at the given speed ratio, rounded to a whole BPM.
pub fn effective_tempo(track_tempo: f64, speed_ratio: f64) -> u32 {
    (track_tempo * speed_ratio).round().max(0.0) as u32
}

/// The speed ratios allowed for a track so that both the ratio and the resulting
/// effective tempo stay within their bounds.
pub fn speed_bounds(track_tempo: f64) -> (f64, f64) {
    if !track_tempo.is_finite() || track_tempo <= 0.0 {
        return (MIN_SPEED, MAX_SPEED);
    }
    let low = MIN_SPEED.max(MIN_TEMPO / track_tempo);
    let high = MAX_SPEED.min(MAX_TEMPO / track_tempo);
    if low > high {
        (high, high)
    } else {
        (low, high)
    }
}

/// Clamps a speed ratio into the bounds for the given track tempo.
pub fn clamp_speed(track_tempo: f64, speed_ratio: f64) -> f64 {
    let (low, high) = speed_bounds(track_tempo);
    if speed_ratio.is_finite() {
        speed_ratio.clamp(low, high)
    } else {
        1.0_f64.clamp(low, high)
    }
}

/// The increment for manual speed adjustment, sized so one step moves the
/// effective tempo by roughly one BPM.
pub fn speed_step(track_tempo: f64) -> f64 {
    (1.0 / track_tempo).clamp(0.001, 0.05)
}

/// Rolling tap-tempo estimator.
#[derive(Debug, Default, Clone)]
pub struct TapTempo {
    /// Tap timestamps in milliseconds, oldest first.
    taps: VecDeque<f64>,
}

impl TapTempo {
    /// Creates an empty tap window.
    pub fn new() -> TapTempo {
        TapTempo {
            taps: VecDeque::with_capacity(TAP_WINDOW),
        }
    }

    /// Records a tap and returns the current estimate, if there is one.
    pub fn tap(&mut self, at_ms: f64) -> Option<u32> {
        if let Some(&last) = self.taps.back() {
            if at_ms - last > TAP_RESET_MS || at_ms < last {
                self.taps.clear();
            }
        }

        self.taps.push_back(at_ms);
        while self.taps.len() > TAP_WINDOW {
            self.taps.pop_front();
        }

        self.bpm()
    }

    /// Returns the BPM estimated from the taps in the window. At least two taps are needed.
    pub fn bpm(&self) -> Option<u32> {
        if self.taps.len() < 2 {
            return None;
        }
        let first = *self.taps.front()?;
        let last = *self.taps.back()?;
        let mean_interval_ms = (last - first) / (self.taps.len() - 1) as f64;
        if mean_interval_ms <= 0.0 {
            return None;
        }
        Some((60000.0 / mean_interval_ms).round().clamp(MIN_TEMPO, MAX_TEMPO) as u32)
    }

    /// Number of taps currently in the window.
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    /// Returns true if no taps are in the window.
    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Clears the window.
    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_speed_ratio_and_effective_tempo() {
        assert_eq!(1.5, speed_ratio(180.0, 120.0));
        assert_eq!(180, effective_tempo(120.0, 1.5));
        assert_eq!(127, effective_tempo(127.0, 1.0));
        assert_eq!(64, effective_tempo(127.0, 0.5));
    }

    #[test]
    fn test_effective_tempo_round_trip() {
        for tempo in 40..=300 {
            let tempo = tempo as f64;
            let (low, high) = speed_bounds(tempo);
            let mut ratio = low;
            while ratio <= high {
                let recovered = speed_ratio(effective_tempo(tempo, ratio) as f64, tempo);
                // Rounding to a whole BPM moves the ratio by at most half a BPM.
                assert!(
                    (recovered - ratio).abs() <= 0.5 / tempo + 1e-9,
                    "tempo {} ratio {} recovered {}",
                    tempo,
                    ratio,
                    recovered
                );
                ratio += 0.037;
            }
        }
    }

    #[test]
    fn test_speed_bounds() {
        assert_eq!((0.5, 2.0), speed_bounds(120.0));
        // At 200 BPM doubling would exceed 300.
        assert_eq!((0.5, 1.5), speed_bounds(200.0));
        // At 60 BPM halving would go below 40.
        let (low, high) = speed_bounds(60.0);
        assert!((low - 40.0 / 60.0).abs() < 1e-12);
        assert_eq!(2.0, high);
    }

    #[test]
    fn test_clamp_speed() {
        assert_eq!(2.0, clamp_speed(120.0, 3.0));
        assert_eq!(0.5, clamp_speed(120.0, 0.1));
        assert_eq!(1.5, clamp_speed(200.0, 1.9));
        assert_eq!(1.0, clamp_speed(120.0, f64::NAN));
    }

    #[test]
    fn test_speed_step() {
        assert_eq!(0.05, speed_step(10.0));
        assert!((speed_step(120.0) - 1.0 / 120.0).abs() < 1e-12);
        assert_eq!(0.001, speed_step(5000.0));
    }

    #[test]
    fn test_tap_tempo_120() {
        let mut tap = TapTempo::new();
        assert_eq!(None, tap.tap(0.0));
        tap.tap(500.0);
        tap.tap(1000.0);
        assert_eq!(Some(120), tap.tap(1500.0));
    }

    #[test]
    fn test_tap_tempo_resets_after_gap() {
        let mut tap = TapTempo::new();
        tap.tap(0.0);
        tap.tap(1000.0);
        assert_eq!(Some(60), tap.bpm());

        // More than three seconds later, the window starts over.
        assert_eq!(None, tap.tap(4500.0));
        assert_eq!(1, tap.len());
        assert_eq!(Some(100), tap.tap(5100.0));
    }

    #[test]
    fn test_tap_tempo_window_is_bounded() {
        let mut tap = TapTempo::new();
        // Slow taps first, then fast ones push them out of the window.
        for i in 0..4 {
            tap.tap(i as f64 * 1000.0);
        }
        let start = 3000.0;
        let mut bpm = None;
        for i in 1..=8 {
            bpm = tap.tap(start + i as f64 * 250.0);
        }
        assert_eq!(8, tap.len());
        assert_eq!(Some(240), bpm);
    }

    #[test]
    fn test_tap_tempo_clamps() {
        let mut tap = TapTempo::new();
        tap.tap(0.0);
        assert_eq!(Some(300), tap.tap(50.0));
        tap.reset();
        assert!(tap.is_empty());
        tap.tap(0.0);
        assert_eq!(Some(40), tap.tap(2900.0));
    }
}
