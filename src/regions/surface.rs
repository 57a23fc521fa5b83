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
use std::fmt;

use tracing::debug;

use crate::track::TrackId;

/// Identifies a region on the waveform surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    Loop { track: TrackId },
    Cue { track: TrackId, index: usize },
}

impl RegionId {
    pub fn track(&self) -> TrackId {
        match self {
            RegionId::Loop { track } | RegionId::Cue { track, .. } => *track,
        }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionId::Loop { track } => write!(f, "loop-region-{}", track),
            RegionId::Cue { track, index } => write!(f, "cue-{}-{}", track, index),
        }
    }
}

/// A region in both time and pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub start: f64,
    pub end: f64,
    pub start_px: f64,
    pub end_px: f64,
}

impl Region {
    pub fn new(id: RegionId, start: f64, end: f64, pixels_per_second: f64) -> Region {
        Region {
            id,
            start,
            end,
            start_px: start * pixels_per_second,
            end_px: end * pixels_per_second,
        }
    }
}

/// Whatever draws the waveform and its regions.
///
/// Removing a region or badge that isn't there must be a no-op.
pub trait WaveformSurface {
    fn create_region(&mut self, region: &Region);

    fn update_region(&mut self, region: &Region);

    fn remove_region(&mut self, id: &RegionId);

    /// Attaches a label to an existing region.
    fn attach_badge(&mut self, id: &RegionId, label: &str);

    fn remove_badge(&mut self, id: &RegionId);
}

impl<T: WaveformSurface + ?Sized> WaveformSurface for &mut T {
    fn create_region(&mut self, region: &Region) {
        (**self).create_region(region)
    }

    fn update_region(&mut self, region: &Region) {
        (**self).update_region(region)
    }

    fn remove_region(&mut self, id: &RegionId) {
        (**self).remove_region(id)
    }

    fn attach_badge(&mut self, id: &RegionId, label: &str) {
        (**self).attach_badge(id, label)
    }

    fn remove_badge(&mut self, id: &RegionId) {
        (**self).remove_badge(id)
    }
}

/// A surface that only logs. Used when nothing is drawing.
#[derive(Debug, Default)]
pub struct LogSurface;

impl WaveformSurface for LogSurface {
    fn create_region(&mut self, region: &Region) {
        debug!(region = %region.id, start = region.start, end = region.end, "Create region");
    }

    fn update_region(&mut self, region: &Region) {
        debug!(region = %region.id, start = region.start, end = region.end, "Update region");
    }

    fn remove_region(&mut self, id: &RegionId) {
        debug!(region = %id, "Remove region");
    }

    fn attach_badge(&mut self, id: &RegionId, label: &str) {
        debug!(region = %id, label, "Attach badge");
    }

    fn remove_badge(&mut self, id: &RegionId) {
        debug!(region = %id, "Remove badge");
    }
}

/// A surface that records every command and keeps the resulting state.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub commands: Vec<SurfaceCommand>,
    pub regions: std::collections::HashMap<RegionId, Region>,
    pub badges: std::collections::HashMap<RegionId, String>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    Create(RegionId),
    Update(RegionId),
    Remove(RegionId),
    AttachBadge(RegionId, String),
    RemoveBadge(RegionId),
}

#[cfg(test)]
impl RecordingSurface {
    pub fn count(&self, matches: impl Fn(&SurfaceCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| matches(command)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|command| matches!(command, SurfaceCommand::Create(_)))
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
impl WaveformSurface for RecordingSurface {
    fn create_region(&mut self, region: &Region) {
        self.commands.push(SurfaceCommand::Create(region.id));
        self.regions.insert(region.id, *region);
    }

    fn update_region(&mut self, region: &Region) {
        self.commands.push(SurfaceCommand::Update(region.id));
        self.regions.insert(region.id, *region);
    }

    fn remove_region(&mut self, id: &RegionId) {
        assert!(
            !self.badges.contains_key(id),
            "region {} removed with a badge still attached",
            id
        );
        self.commands.push(SurfaceCommand::Remove(*id));
        self.regions.remove(id);
    }

    fn attach_badge(&mut self, id: &RegionId, label: &str) {
        assert!(self.regions.contains_key(id), "badge on missing region {}", id);
        self.commands
            .push(SurfaceCommand::AttachBadge(*id, label.to_string()));
        self.badges.insert(*id, label.to_string());
    }

    fn remove_badge(&mut self, id: &RegionId) {
        self.commands.push(SurfaceCommand::RemoveBadge(*id));
        self.badges.remove(id);
    }
}
