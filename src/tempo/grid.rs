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

//! Beat and measure grid computation.
//!
//! All functions here are stateless: identical inputs always produce identical,
//! strictly increasing sequences of grid lines.

use super::TimeSignature;

/// Which grid lines to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridResolution {
    /// Every beat, tagged with its measure and beat number.
    Beats,
    /// Only the first beat of every measure.
    Measures,
}

/// The inputs to the grid calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    /// Tempo in BPM.
    pub tempo: f64,
    /// The meter of the track.
    pub time_signature: TimeSignature,
    /// Time in seconds of the first downbeat; the grid origin.
    pub first_measure_time: f64,
    /// Length of the buffer in seconds.
    pub duration: f64,
}

/// A single line on the tempo grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLine {
    /// Time of the line in seconds.
    pub time: f64,
    /// 1-based measure number.
    pub measure: u32,
    /// 1-based beat number within the measure.
    pub beat: u32,
}

impl GridLine {
    /// Returns true if this line starts a measure.
    pub fn is_downbeat(&self) -> bool {
        self.beat == 1
    }
}

/// Duration of a single beat: (60 / tempo) * (4 / denominator).
pub fn beat_duration(tempo: f64, time_signature: TimeSignature) -> f64 {
    (60.0 / tempo) * (4.0 / time_signature.denominator as f64)
}

/// Duration of a whole measure.
pub fn measure_duration(tempo: f64, time_signature: TimeSignature) -> f64 {
    time_signature.beats_per_measure() * beat_duration(tempo, time_signature)
}

/// Scale from seconds to pixels for the given zoom.
pub fn pixels_per_second(base_pixels_per_second: f64, zoom: f64) -> f64 {
    base_pixels_per_second * zoom
}

/// Maps a timestamp to a pixel offset.
pub fn time_to_pixels(time: f64, base_pixels_per_second: f64, zoom: f64) -> f64 {
    time * pixels_per_second(base_pixels_per_second, zoom)
}

/// Maps a pixel offset back to a timestamp. Returns 0 for a degenerate scale.
pub fn pixels_to_time(pixels: f64, base_pixels_per_second: f64, zoom: f64) -> f64 {
    let pps = pixels_per_second(base_pixels_per_second, zoom);
    if pps > 0.0 {
        pixels / pps
    } else {
        0.0
    }
}

impl GridParams {
    fn is_valid(&self) -> bool {
        self.tempo.is_finite()
            && self.tempo > 0.0
            && self.first_measure_time.is_finite()
            && self.first_measure_time >= 0.0
            && self.duration.is_finite()
    }

    /// Enumerates grid lines from the first measure up to and including the duration.
    pub fn lines(&self, resolution: GridResolution) -> Vec<GridLine> {
        if !self.is_valid() || self.duration < self.first_measure_time {
            return Vec::new();
        }

        let beats_per_measure = self.time_signature.numerator;
        let step = match resolution {
            GridResolution::Beats => beat_duration(self.tempo, self.time_signature),
            GridResolution::Measures => measure_duration(self.tempo, self.time_signature),
        };

        // Lines are computed by index rather than by accumulation so long
        // buffers don't drift.
        let count = ((self.duration - self.first_measure_time) / step).floor() as u64 + 1;
        (0..count)
            .map(|i| {
                let time = self.first_measure_time + i as f64 * step;
                match resolution {
                    GridResolution::Beats => GridLine {
                        time,
                        measure: (i / beats_per_measure as u64) as u32 + 1,
                        beat: (i % beats_per_measure as u64) as u32 + 1,
                    },
                    GridResolution::Measures => GridLine {
                        time,
                        measure: i as u32 + 1,
                        beat: 1,
                    },
                }
            })
            .collect()
    }

    /// Snaps a time to the nearest beat at or after the grid origin, never past the duration.
    pub fn nearest_beat(&self, time: f64) -> f64 {
        if !self.is_valid() || !time.is_finite() {
            return time;
        }
        let step = beat_duration(self.tempo, self.time_signature);
        let index = ((time - self.first_measure_time) / step).round().max(0.0);
        let snapped = self.first_measure_time + index * step;
        if snapped > self.duration {
            snapped - step
        } else {
            snapped
        }
        .max(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(tempo: f64, numerator: u32, denominator: u32, duration: f64) -> GridParams {
        GridParams {
            tempo,
            time_signature: TimeSignature::new(numerator, denominator),
            first_measure_time: 0.0,
            duration,
        }
    }

    #[test]
    fn test_beat_and_measure_duration() {
        let ts = TimeSignature::new(4, 4);
        assert_eq!(0.5, beat_duration(120.0, ts));
        assert_eq!(2.0, measure_duration(120.0, ts));

        // Eighth-note beats are half as long.
        let ts = TimeSignature::new(6, 8);
        assert_eq!(0.25, beat_duration(120.0, ts));
        assert_eq!(1.5, measure_duration(120.0, ts));
    }

    #[test]
    fn test_four_four_at_120() {
        let lines = params(120.0, 4, 4, 8.0).lines(GridResolution::Beats);
        let first: Vec<f64> = lines.iter().take(4).map(|l| l.time).collect();
        assert_eq!(vec![0.0, 0.5, 1.0, 1.5], first);

        let measure_two = lines.iter().find(|l| l.measure == 2).unwrap();
        assert_eq!(2.0, measure_two.time);
        assert_eq!(1, measure_two.beat);
        assert!(measure_two.is_downbeat());

        // 0.0 through 8.0 inclusive.
        assert_eq!(17, lines.len());
    }

    #[test]
    fn test_measures_only() {
        let lines = params(120.0, 3, 4, 6.0).lines(GridResolution::Measures);
        let times: Vec<f64> = lines.iter().map(|l| l.time).collect();
        assert_eq!(vec![0.0, 1.5, 3.0, 4.5, 6.0], times);
        assert!(lines.iter().all(|l| l.is_downbeat()));
        assert_eq!(5, lines.last().unwrap().measure);
    }

    #[test]
    fn test_first_measure_offset() {
        let mut p = params(120.0, 4, 4, 3.0);
        p.first_measure_time = 0.25;
        let lines = p.lines(GridResolution::Beats);
        assert_eq!(0.25, lines[0].time);
        assert_eq!(2.25, lines[4].time);
        assert_eq!(2, lines[4].measure);
    }

    #[test]
    fn test_strictly_increasing_for_many_tempos() {
        for tempo in (40..=300).step_by(7) {
            for (n, d) in [(4, 4), (3, 4), (7, 8), (5, 16), (1, 1)] {
                let lines = params(tempo as f64, n, d, 30.0).lines(GridResolution::Beats);
                assert!(!lines.is_empty());
                for pair in lines.windows(2) {
                    assert!(
                        pair[1].time > pair[0].time,
                        "tempo {} {}/{} not increasing",
                        tempo,
                        n,
                        d
                    );
                }
            }
        }
    }

    #[test]
    fn test_pixel_offsets_monotonic_in_zoom() {
        let lines = params(97.0, 4, 4, 12.0).lines(GridResolution::Beats);
        for line in lines {
            let mut last = f64::NEG_INFINITY;
            for zoom in [0.25, 0.5, 1.0, 1.5, 2.0, 4.0, 10.0] {
                let px = time_to_pixels(line.time, 100.0, zoom);
                assert!(px >= last);
                last = px;
            }
        }
    }

    #[test]
    fn test_invalid_params_yield_empty_grid() {
        assert!(params(0.0, 4, 4, 8.0).lines(GridResolution::Beats).is_empty());
        assert!(params(f64::NAN, 4, 4, 8.0)
            .lines(GridResolution::Beats)
            .is_empty());
        let mut p = params(120.0, 4, 4, 1.0);
        p.first_measure_time = 2.0;
        assert!(p.lines(GridResolution::Beats).is_empty());
    }

    #[test]
    fn test_pixels_round_trip() {
        assert_eq!(250.0, time_to_pixels(2.5, 100.0, 1.0));
        assert_eq!(500.0, time_to_pixels(2.5, 100.0, 2.0));
        assert_eq!(2.5, pixels_to_time(500.0, 100.0, 2.0));
        assert_eq!(0.0, pixels_to_time(500.0, 100.0, 0.0));
    }

    #[test]
    fn test_nearest_beat() {
        let p = params(120.0, 4, 4, 8.0);
        assert_eq!(1.0, p.nearest_beat(1.1));
        assert_eq!(1.5, p.nearest_beat(1.3));
        assert_eq!(0.0, p.nearest_beat(-3.0));
        assert_eq!(8.0, p.nearest_beat(7.9));
    }
}
