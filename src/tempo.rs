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

//! Tempo math for the sample deck.
//!
//! Everything in here is pure: the grid calculator turns tempo and meter into
//! beat timestamps and pixel offsets, and the speed mapper converts between
//! tempo and playback speed ratios.

use std::{fmt, str::FromStr};

use serde::Deserialize;

pub mod grid;
pub mod speed;

pub use grid::{GridLine, GridParams, GridResolution};
pub use speed::TapTempo;

/// The slowest tempo a track may carry.
pub const MIN_TEMPO: f64 = 40.0;

/// The fastest tempo a track may carry.
pub const MAX_TEMPO: f64 = 300.0;

/// Largest numerator or denominator accepted for a time signature.
const MAX_SIGNATURE_PART: u32 = 32;

/// Time signature (numerator/denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Creates a time signature, clamping both parts into 1..=32.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        TimeSignature {
            numerator: numerator.clamp(1, MAX_SIGNATURE_PART),
            denominator: denominator.clamp(1, MAX_SIGNATURE_PART),
        }
    }

    /// Get beats per measure
    pub fn beats_per_measure(&self) -> f64 {
        self.numerator as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numerator, denominator) = s
            .split_once('/')
            .ok_or_else(|| format!("time signature must look like 4/4, got {}", s))?;
        let numerator: u32 = numerator
            .trim()
            .parse()
            .map_err(|e| format!("invalid time signature numerator: {}", e))?;
        let denominator: u32 = denominator
            .trim()
            .parse()
            .map_err(|e| format!("invalid time signature denominator: {}", e))?;
        if !(1..=MAX_SIGNATURE_PART).contains(&numerator)
            || !(1..=MAX_SIGNATURE_PART).contains(&denominator)
        {
            return Err(format!("time signature {} is out of range", s));
        }
        Ok(TimeSignature::new(numerator, denominator))
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Clamps a tempo into the supported BPM range. Non-finite values fall back to 120.
pub fn clamp_tempo(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_TEMPO, MAX_TEMPO)
    } else {
        120.0
    }
}
