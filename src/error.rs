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

use crate::audio::decode::DecodeError;
use crate::playback::SessionId;
use crate::track::TrackId;

/// Errors raised by the sample deck.
///
/// Only `Decode` and `EngineNotReady` are meant to reach a user. Region errors
/// are corrected where they occur and stale session operations are ignored by
/// the workstation.
#[derive(Debug, thiserror::Error)]
pub enum WorkstationError {
    #[error("Track failed to load: {0}")]
    Decode(#[from] DecodeError),

    #[error("Audio engine is not ready; tap the trigger to enable sound")]
    EngineNotReady,

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Session {0} has been superseded")]
    StaleSessionOp(SessionId),

    #[error("Unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("Track {track} has no cue point {index}")]
    UnknownCue { track: TrackId, index: usize },

    #[error("Audio device error: {0}")]
    Device(String),
}

impl WorkstationError {
    /// Returns true for failures that the workstation recovers from on its own.
    pub fn is_recoverable_internally(&self) -> bool {
        matches!(
            self,
            WorkstationError::InvalidRegion(_) | WorkstationError::StaleSessionOp(_)
        )
    }
}
