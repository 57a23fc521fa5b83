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
use tracing::debug;

use crate::track::{Mode, TrackId, MAX_CUE_POINTS};

pub mod debounce;
pub mod surface;
pub mod synchronizer;

pub use debounce::DebouncedCommit;
pub use surface::{LogSurface, Region, RegionId, WaveformSurface};
pub use synchronizer::{GestureState, RegionSynchronizer, SyncOutcome};

/// Maps a digit key to a cue index: '1' through '9' are cues 0 to 8 and '0' is cue 9.
pub fn digit_to_cue_index(key: char) -> Option<usize> {
    let digit = key.to_digit(10)? as usize;
    let index = if digit == 0 { 9 } else { digit - 1 };
    (index < MAX_CUE_POINTS).then_some(index)
}

/// The one track, if any, that digit keys trigger cues on.
#[derive(Debug, Default, Clone, Copy)]
pub struct CueKeyboard {
    selected: Option<TrackId>,
}

impl CueKeyboard {
    /// Selects a track, replacing any previous selection. Returns the previous one.
    pub fn select(&mut self, track: TrackId) -> Option<TrackId> {
        let previous = self.selected.replace(track);
        if previous != Some(track) {
            debug!(track = %track, previous = ?previous, "Cue track selected");
        }
        previous
    }

    /// Clears the selection if it is `track`.
    pub fn deselect(&mut self, track: TrackId) {
        if self.selected == Some(track) {
            self.selected = None;
        }
    }

    pub fn selected(&self) -> Option<TrackId> {
        self.selected
    }

    /// Resolves a key press to a cue on the selected track. Only accepted while
    /// that track is in cue mode.
    pub fn resolve(&self, key: char, mode_of: impl Fn(TrackId) -> Option<Mode>) -> Option<(TrackId, usize)> {
        let track = self.selected?;
        if mode_of(track)? != Mode::Cue {
            return None;
        }
        Some((track, digit_to_cue_index(key)?))
    }
}
