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

//! The track model: one decoded asset plus its mode, loop, cue and tempo state.
//!
//! The track is the single source of truth for loop bounds and cue points. All
//! setters enforce the region invariants, correcting out-of-range input instead
//! of rejecting it.

use std::{fmt, str::FromStr};

use serde::Deserialize;
use tracing::warn;

use crate::audio::buffer::DecodedBuffer;
use crate::error::WorkstationError;
use crate::tempo::{self, GridParams, TimeSignature};

/// Maximum number of cue points on a track.
pub const MAX_CUE_POINTS: usize = 10;

/// Shortest allowed loop in seconds.
pub const MIN_LOOP_LENGTH: f64 = 0.1;

/// Cue points are kept at least this far from the end of the buffer.
pub const CUE_TAIL_EPSILON: f64 = 0.05;

/// Identifies a loaded track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub fn new(id: u64) -> TrackId {
        TrackId(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a track responds to triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One-shot playback from the scrub position to the end of the buffer.
    #[default]
    Preview,
    /// Wrap-looping between the loop bounds.
    Loop,
    /// One-shot playback from a cue point to the end of the buffer.
    Cue,
}

impl Mode {
    /// Returns true for modes that stop at the end of the buffer.
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, Mode::Loop)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Preview => "preview",
            Mode::Loop => "loop",
            Mode::Cue => "cue",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preview" => Ok(Mode::Preview),
            "loop" => Ok(Mode::Loop),
            "cue" => Ok(Mode::Cue),
            _ => Err(format!("unknown mode {}", s)),
        }
    }
}

/// Clamps loop bounds so that 0 <= start < end <= duration and end - start >= MIN_LOOP_LENGTH.
///
/// When the requested loop is too short, the end is pushed out first; the start only
/// moves when the end is already at the buffer's tail.
pub fn clamp_loop_bounds(start: f64, end: f64, duration: f64) -> (f64, f64) {
    let duration = if duration.is_finite() {
        duration.max(0.0)
    } else {
        0.0
    };
    if duration <= MIN_LOOP_LENGTH {
        return (0.0, duration);
    }

    let start = if start.is_finite() { start } else { 0.0 };
    let end = if end.is_finite() { end } else { duration };

    let mut start = start.clamp(0.0, duration - MIN_LOOP_LENGTH);
    let mut end = end.clamp(0.0, duration);
    if end - start < MIN_LOOP_LENGTH {
        end = (start + MIN_LOOP_LENGTH).min(duration);
        if end - start < MIN_LOOP_LENGTH {
            start = (end - MIN_LOOP_LENGTH).max(0.0);
        }
    }
    (start, end)
}

/// Clamps a cue time into [0, duration - CUE_TAIL_EPSILON].
pub fn clamp_cue_time(time: f64, duration: f64) -> f64 {
    let latest = (duration - CUE_TAIL_EPSILON).max(0.0);
    if time.is_finite() {
        time.clamp(0.0, latest)
    } else {
        0.0
    }
}

/// One loaded audio asset and its editable state.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    buffer: DecodedBuffer,
    mode: Mode,
    loop_start: f64,
    loop_end: f64,
    /// Ordered by index, not by time.
    cue_points: Vec<f64>,
    tempo: f64,
    time_signature: TimeSignature,
    first_measure_time: f64,
}

impl Track {
    /// Creates a track in preview mode that loops the whole buffer and has no cue points.
    pub fn new(
        id: TrackId,
        buffer: DecodedBuffer,
        tempo: f64,
        time_signature: TimeSignature,
    ) -> Track {
        let (loop_start, loop_end) = clamp_loop_bounds(0.0, buffer.duration(), buffer.duration());
        Track {
            id,
            buffer,
            mode: Mode::default(),
            loop_start,
            loop_end,
            cue_points: Vec::new(),
            tempo: tempo::clamp_tempo(tempo),
            time_signature,
            first_measure_time: 0.0,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn buffer(&self) -> &DecodedBuffer {
        &self.buffer
    }

    /// Length of the buffer in seconds.
    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn loop_bounds(&self) -> (f64, f64) {
        (self.loop_start, self.loop_end)
    }

    pub fn cue_points(&self) -> &[f64] {
        &self.cue_points
    }

    pub fn cue_point(&self, index: usize) -> Option<f64> {
        self.cue_points.get(index).copied()
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn first_measure_time(&self) -> f64 {
        self.first_measure_time
    }

    /// The inputs for this track's beat grid.
    pub fn grid_params(&self) -> GridParams {
        GridParams {
            tempo: self.tempo,
            time_signature: self.time_signature,
            first_measure_time: self.first_measure_time,
            duration: self.duration(),
        }
    }

    /// Sets the mode. Returns true if it changed.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    /// Sets the loop bounds, correcting them to satisfy the loop invariants.
    /// Returns true if the stored bounds changed.
    pub fn set_loop_bounds(&mut self, start: f64, end: f64) -> bool {
        let (clamped_start, clamped_end) = clamp_loop_bounds(start, end, self.duration());
        if clamped_start != start || clamped_end != end {
            warn!(
                track = %self.id,
                start,
                end,
                clamped_start,
                clamped_end,
                "Loop bounds corrected"
            );
        }
        let changed = (clamped_start, clamped_end) != (self.loop_start, self.loop_end);
        self.loop_start = clamped_start;
        self.loop_end = clamped_end;
        changed
    }

    /// Sets or appends a cue point. `index` may address an existing cue point or
    /// the next free slot. Returns true if the stored value changed.
    pub fn set_cue_point(&mut self, index: usize, time: f64) -> Result<bool, WorkstationError> {
        if index >= MAX_CUE_POINTS || index > self.cue_points.len() {
            return Err(WorkstationError::UnknownCue {
                track: self.id,
                index,
            });
        }

        let clamped = clamp_cue_time(time, self.duration());
        if clamped != time {
            warn!(track = %self.id, index, time, clamped, "Cue point corrected");
        }

        if index == self.cue_points.len() {
            self.cue_points.push(clamped);
            return Ok(true);
        }
        let changed = self.cue_points[index] != clamped;
        self.cue_points[index] = clamped;
        Ok(changed)
    }

    /// Removes a cue point, shifting later cue points down by one.
    pub fn remove_cue_point(&mut self, index: usize) -> Result<f64, WorkstationError> {
        if index >= self.cue_points.len() {
            return Err(WorkstationError::UnknownCue {
                track: self.id,
                index,
            });
        }
        Ok(self.cue_points.remove(index))
    }

    /// Sets the track tempo, clamped into the supported range. Returns the stored tempo.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.tempo = tempo::clamp_tempo(bpm);
        self.tempo
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    /// Sets the grid origin, clamped into the buffer.
    pub fn set_first_measure_time(&mut self, time: f64) {
        self.first_measure_time = if time.is_finite() {
            time.clamp(0.0, self.duration())
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::silent_buffer;

    fn track(duration: f64) -> Track {
        Track::new(
            TrackId::new(1),
            silent_buffer(duration, 1000),
            120.0,
            TimeSignature::default(),
        )
    }

    #[test]
    fn test_new_track_defaults() {
        let track = track(10.0);
        assert_eq!(Mode::Preview, track.mode());
        assert_eq!((0.0, 10.0), track.loop_bounds());
        assert!(track.cue_points().is_empty());
        assert_eq!(120.0, track.tempo());
        assert_eq!(10.0, track.duration());
    }

    #[test]
    fn test_clamp_loop_bounds() {
        assert_eq!((2.0, 8.0), clamp_loop_bounds(2.0, 8.0, 10.0));
        assert_eq!((0.0, 10.0), clamp_loop_bounds(-1.0, 12.0, 10.0));
        // Too short: end is pushed out.
        assert_eq!((5.0, 5.1), clamp_loop_bounds(5.0, 5.02, 10.0));
        // Inverted: end is pushed past start.
        assert_eq!((5.0, 5.1), clamp_loop_bounds(5.0, 1.0, 10.0));
        // At the tail the start moves instead.
        let (start, end) = clamp_loop_bounds(9.99, 10.0, 10.0);
        assert_eq!(10.0, end);
        assert!((end - start - MIN_LOOP_LENGTH).abs() < 1e-9);
        // Tiny buffers loop the whole thing.
        assert_eq!((0.0, 0.05), clamp_loop_bounds(0.01, 0.02, 0.05));
        assert_eq!((0.0, 10.0), clamp_loop_bounds(f64::NAN, f64::NAN, 10.0));
    }

    #[test]
    fn test_loop_bounds_invariants_hold() {
        let duration = 7.3;
        for start in [-2.0, 0.0, 0.05, 3.0, 7.25, 7.3, 9.0] {
            for end in [-1.0, 0.0, 0.04, 3.01, 7.2, 7.3, 11.0] {
                let (s, e) = clamp_loop_bounds(start, end, duration);
                assert!(s >= 0.0, "{} {}", start, end);
                assert!(e <= duration, "{} {}", start, end);
                assert!(e - s >= MIN_LOOP_LENGTH - 1e-9, "{} {}", start, end);
            }
        }
    }

    #[test]
    fn test_set_loop_bounds_reports_change() {
        let mut track = track(10.0);
        assert!(track.set_loop_bounds(2.0, 8.0));
        assert!(!track.set_loop_bounds(2.0, 8.0));
        assert_eq!((2.0, 8.0), track.loop_bounds());
    }

    #[test]
    fn test_clamp_cue_time() {
        let duration = 4.0;
        let clamped = clamp_cue_time(duration - 0.01, duration);
        assert!((clamped - (duration - CUE_TAIL_EPSILON)).abs() < 1e-12);
        assert_eq!(0.0, clamp_cue_time(-1.0, duration));
        assert_eq!(1.5, clamp_cue_time(1.5, duration));
        assert_eq!(0.0, clamp_cue_time(0.5, 0.01));
    }

    #[test]
    fn test_cue_points() {
        let mut track = track(10.0);
        assert!(track.set_cue_point(0, 1.0).unwrap());
        assert!(track.set_cue_point(1, 2.0).unwrap());
        assert!(!track.set_cue_point(1, 2.0).unwrap());
        assert!(track.set_cue_point(0, 3.0).unwrap());
        assert_eq!(&[3.0, 2.0], track.cue_points());

        // Can't leave gaps.
        assert!(matches!(
            track.set_cue_point(5, 1.0),
            Err(WorkstationError::UnknownCue { index: 5, .. })
        ));

        assert_eq!(3.0, track.remove_cue_point(0).unwrap());
        assert_eq!(&[2.0], track.cue_points());
        assert!(track.remove_cue_point(4).is_err());
    }

    #[test]
    fn test_cue_points_are_capped() {
        let mut track = track(20.0);
        for i in 0..MAX_CUE_POINTS {
            track.set_cue_point(i, i as f64).unwrap();
        }
        assert!(track.set_cue_point(MAX_CUE_POINTS, 15.0).is_err());
        assert_eq!(MAX_CUE_POINTS, track.cue_points().len());
    }

    #[test]
    fn test_tempo_and_grid_origin() {
        let mut track = track(10.0);
        assert_eq!(300.0, track.set_tempo(400.0));
        track.set_first_measure_time(12.0);
        assert_eq!(10.0, track.first_measure_time());
        track.set_time_signature(TimeSignature::new(3, 4));
        assert_eq!(3, track.grid_params().time_signature.numerator);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Ok(Mode::Loop), "loop".parse());
        assert_eq!(Ok(Mode::Cue), "CUE".parse());
        assert!("shuffle".parse::<Mode>().is_err());
        assert!(Mode::Cue.is_one_shot());
        assert!(!Mode::Loop.is_one_shot());
    }
}
