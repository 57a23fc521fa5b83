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
use crate::audio::DecodedBuffer;
use crate::tempo::grid;

/// The sample range covered by one column of the overview.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

/// Min/max peaks over all channels, one per bucket.
pub fn peaks(buffer: &DecodedBuffer, buckets: usize) -> Vec<Peak> {
    let frames = buffer.frames();
    if buckets == 0 || frames == 0 {
        return Vec::new();
    }

    (0..buckets)
        .map(|bucket| {
            let start = bucket * frames / buckets;
            let end = ((bucket + 1) * frames / buckets).max(start + 1).min(frames);
            let mut peak = Peak {
                min: f32::MAX,
                max: f32::MIN,
            };
            for channel in 0..buffer.channel_count() as usize {
                for sample in &buffer.channel(channel)[start..end] {
                    peak.min = peak.min.min(*sample);
                    peak.max = peak.max.max(*sample);
                }
            }
            peak
        })
        .collect()
}

/// Peaks with one bucket per pixel at the given zoom.
pub fn peaks_for_zoom(buffer: &DecodedBuffer, base_pixels_per_second: f64, zoom: f64) -> Vec<Peak> {
    let width = grid::time_to_pixels(buffer.duration(), base_pixels_per_second, zoom);
    if !width.is_finite() || width <= 0.0 {
        return Vec::new();
    }
    peaks(buffer, width.ceil() as usize)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{ramp_buffer, silent_buffer};

    #[test]
    fn test_peaks_cover_the_buffer() {
        let buffer = ramp_buffer(100, 100);
        let peaks = peaks(&buffer, 4);
        assert_eq!(4, peaks.len());
        assert_eq!(0.0, peaks[0].min);
        assert!((peaks[0].max - 0.24).abs() < 1e-6);
        assert!((peaks[3].max - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_more_buckets_than_frames() {
        let buffer = ramp_buffer(3, 100);
        let peaks = peaks(&buffer, 6);
        assert_eq!(6, peaks.len());
        assert!(peaks.iter().all(|peak| peak.min <= peak.max));
    }

    #[test]
    fn test_peaks_for_zoom() {
        let buffer = silent_buffer(2.0, 1000);
        assert_eq!(200, peaks_for_zoom(&buffer, 100.0, 1.0).len());
        assert_eq!(400, peaks_for_zoom(&buffer, 100.0, 2.0).len());
        assert!(peaks(&buffer, 0).is_empty());
    }
}
