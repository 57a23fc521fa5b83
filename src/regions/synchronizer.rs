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

//! Keeps the regions on the waveform surface and the track's loop and cue
//! values in step.
//!
//! Two directions of change meet here. A drag on the surface becomes a
//! debounced commit to the track. A change to the track becomes a redraw of
//! the surface. Commits update the rendered snapshot as they land, so a commit
//! never bounces back as a redraw.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::debounce::DebouncedCommit;
use super::surface::{Region, RegionId, WaveformSurface};
use crate::error::WorkstationError;
use crate::tempo::grid;
use crate::track::{clamp_cue_time, clamp_loop_bounds, Mode, Track, TrackId, CUE_TAIL_EPSILON};

/// Where a region is in an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Dragging,
    /// Released, waiting for the debounced commit.
    Committing,
}

/// What a call to [`RegionSynchronizer::sync`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing changed since the last render.
    Skipped,
    /// Only the zoom changed; existing regions were moved.
    Updated,
    /// Regions were torn down and created again.
    Recreated,
    /// A drag is in progress; try again later.
    Deferred,
}

/// The domain values a render was made from.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    mode: Mode,
    loop_bounds: (f64, f64),
    cue_points: Vec<f64>,
}

impl Snapshot {
    fn of(track: &Track) -> Snapshot {
        Snapshot {
            mode: track.mode(),
            loop_bounds: track.loop_bounds(),
            cue_points: track.cue_points().to_vec(),
        }
    }

    /// Copies one committed value from the track. Returns false when the
    /// snapshot has no slot for it.
    fn settle(&mut self, id: RegionId, track: &Track) -> bool {
        match id {
            RegionId::Loop { .. } => {
                self.loop_bounds = track.loop_bounds();
                true
            }
            RegionId::Cue { index, .. } => {
                match (self.cue_points.get_mut(index), track.cue_point(index)) {
                    (Some(time), Some(committed)) => {
                        *time = committed;
                        true
                    }
                    _ => false,
                }
            }
        }
    }
}

/// The span drawn for a cue point.
pub fn cue_region_bounds(time: f64, duration: f64) -> (f64, f64) {
    let start = clamp_cue_time(time, duration);
    (start, (start + CUE_TAIL_EPSILON).min(duration))
}

/// The badge shown on a cue region: the digit key that triggers it.
pub fn cue_badge(index: usize) -> String {
    ((index + 1) % 10).to_string()
}

/// A region synchronizer for a single track.
pub struct RegionSynchronizer {
    track: TrackId,
    base_pixels_per_second: f64,
    commit_delay: Duration,
    snap_to_grid: bool,
    gestures: HashMap<RegionId, GestureState>,
    commits: HashMap<RegionId, DebouncedCommit<(f64, f64)>>,
    snapshot: Option<Snapshot>,
    rendered_zoom: Option<f64>,
    rendered: Vec<Region>,
    badges: HashSet<RegionId>,
    recreations: u64,
}

impl RegionSynchronizer {
    pub fn new(
        track: TrackId,
        base_pixels_per_second: f64,
        commit_delay: Duration,
        snap_to_grid: bool,
    ) -> RegionSynchronizer {
        RegionSynchronizer {
            track,
            base_pixels_per_second,
            commit_delay,
            snap_to_grid,
            gestures: HashMap::new(),
            commits: HashMap::new(),
            snapshot: None,
            rendered_zoom: None,
            rendered: Vec::new(),
            badges: HashSet::new(),
            recreations: 0,
        }
    }

    pub fn gesture_state(&self, id: &RegionId) -> GestureState {
        self.gestures.get(id).copied().unwrap_or_default()
    }

    /// Number of times the regions were rebuilt from scratch.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// The regions currently on the surface.
    pub fn rendered(&self) -> &[Region] {
        &self.rendered
    }

    pub fn has_pending_commits(&self) -> bool {
        self.commits.values().any(DebouncedCommit::is_pending)
    }

    pub fn set_snap_to_grid(&mut self, snap_to_grid: bool) {
        self.snap_to_grid = snap_to_grid;
    }

    fn check_owner(&self, id: &RegionId) -> Result<(), WorkstationError> {
        if id.track() != self.track {
            return Err(WorkstationError::InvalidRegion(format!(
                "{} does not belong to track {}",
                id, self.track
            )));
        }
        Ok(())
    }

    /// A handle of the region was grabbed.
    pub fn drag_start(&mut self, id: RegionId) -> Result<(), WorkstationError> {
        self.check_owner(&id)?;
        debug!(region = %id, "Drag started");
        self.gestures.insert(id, GestureState::Dragging);
        Ok(())
    }

    /// The region was released at `start..end`. The bounds are corrected and
    /// committed to the track once the commit delay passes without another
    /// release. Returns the corrected bounds.
    pub fn drag_end(
        &mut self,
        id: RegionId,
        start: f64,
        end: f64,
        track: &Track,
        now: Instant,
    ) -> Result<(f64, f64), WorkstationError> {
        self.check_owner(&id)?;
        let duration = track.duration();
        let bounds = match id {
            RegionId::Loop { .. } => {
                let (start, end) = if self.snap_to_grid {
                    let params = track.grid_params();
                    (params.nearest_beat(start), params.nearest_beat(end))
                } else {
                    (start, end)
                };
                clamp_loop_bounds(start, end, duration)
            }
            RegionId::Cue { .. } => {
                let start = if self.snap_to_grid {
                    track.grid_params().nearest_beat(start)
                } else {
                    start
                };
                cue_region_bounds(start, duration)
            }
        };
        if bounds != (start, end) {
            debug!(region = %id, start, end, corrected = ?bounds, "Dragged region corrected");
        }

        self.commits
            .entry(id)
            .or_insert_with(|| DebouncedCommit::new(self.commit_delay))
            .schedule(bounds, now);
        self.gestures.insert(id, GestureState::Committing);
        Ok(bounds)
    }

    /// Applies every commit that has come due. Returns the committed regions.
    pub fn poll(
        &mut self,
        now: Instant,
        track: &mut Track,
        surface: &mut dyn WaveformSurface,
    ) -> Vec<RegionId> {
        let due: Vec<(RegionId, (f64, f64))> = self
            .commits
            .iter_mut()
            .filter_map(|(id, commit)| commit.poll(now).map(|bounds| (*id, bounds)))
            .collect();
        self.apply(due, track, surface)
    }

    /// Applies every pending commit immediately.
    pub fn flush(&mut self, track: &mut Track, surface: &mut dyn WaveformSurface) -> Vec<RegionId> {
        let due: Vec<(RegionId, (f64, f64))> = self
            .commits
            .iter_mut()
            .filter_map(|(id, commit)| commit.flush().map(|bounds| (*id, bounds)))
            .collect();
        self.apply(due, track, surface)
    }

    fn apply(
        &mut self,
        due: Vec<(RegionId, (f64, f64))>,
        track: &mut Track,
        surface: &mut dyn WaveformSurface,
    ) -> Vec<RegionId> {
        let mut committed = Vec::with_capacity(due.len());
        for (id, (start, end)) in due {
            let result = match id {
                RegionId::Loop { .. } => {
                    track.set_loop_bounds(start, end);
                    Ok(())
                }
                RegionId::Cue { index, .. } => track.set_cue_point(index, start).map(|_| ()),
            };
            if self.gesture_state(&id) == GestureState::Committing {
                self.gestures.insert(id, GestureState::Idle);
            }
            if let Err(e) = result {
                warn!(region = %id, err = %e, "Dropped region commit");
                continue;
            }
            debug!(region = %id, start, end, "Region committed");

            // The surface already shows the drag. Settle it on the stored
            // values, without a rebuild.
            let bounds = match id {
                RegionId::Loop { .. } => track.loop_bounds(),
                RegionId::Cue { index, .. } => match track.cue_point(index) {
                    Some(time) => cue_region_bounds(time, track.duration()),
                    None => continue,
                },
            };
            let pixels_per_second = self.pixels_per_second(self.rendered_zoom.unwrap_or(1.0));
            if let Some(region) = self.rendered.iter_mut().find(|region| region.id == id) {
                *region = Region::new(id, bounds.0, bounds.1, pixels_per_second);
                surface.update_region(region);
            }
            // Only the committed value counts as drawn. Anything else that
            // changed during the drag still differs from the snapshot.
            let settled = self
                .snapshot
                .as_mut()
                .is_some_and(|snapshot| snapshot.settle(id, track));
            if !settled {
                self.snapshot = None;
            }
            committed.push(id);
        }
        committed
    }

    fn pixels_per_second(&self, zoom: f64) -> f64 {
        grid::pixels_per_second(self.base_pixels_per_second, zoom)
    }

    fn regions_for(&self, track: &Track, zoom: f64) -> Vec<Region> {
        let pixels_per_second = self.pixels_per_second(zoom);
        match track.mode() {
            Mode::Preview => Vec::new(),
            Mode::Loop => {
                let (start, end) = track.loop_bounds();
                vec![Region::new(
                    RegionId::Loop { track: self.track },
                    start,
                    end,
                    pixels_per_second,
                )]
            }
            Mode::Cue => track
                .cue_points()
                .iter()
                .enumerate()
                .map(|(index, time)| {
                    let (start, end) = cue_region_bounds(*time, track.duration());
                    Region::new(
                        RegionId::Cue {
                            track: self.track,
                            index,
                        },
                        start,
                        end,
                        pixels_per_second,
                    )
                })
                .collect(),
        }
    }

    /// Brings the surface in line with the track at the given zoom.
    ///
    /// Regions are only rebuilt when the mode, loop bounds or cue points
    /// differ from the last render. A zoom change alone moves them.
    pub fn sync(
        &mut self,
        track: &Track,
        zoom: f64,
        surface: &mut dyn WaveformSurface,
    ) -> SyncOutcome {
        if self
            .gestures
            .values()
            .any(|state| *state == GestureState::Dragging)
        {
            return SyncOutcome::Deferred;
        }

        let snapshot = Snapshot::of(track);
        if self.snapshot.as_ref() == Some(&snapshot) {
            if self.rendered_zoom == Some(zoom) {
                return SyncOutcome::Skipped;
            }
            self.rendered = self.regions_for(track, zoom);
            for region in self.rendered.iter() {
                surface.update_region(region);
            }
            self.rendered_zoom = Some(zoom);
            return SyncOutcome::Updated;
        }

        self.teardown(surface);
        self.rendered = self.regions_for(track, zoom);
        for region in self.rendered.iter() {
            surface.create_region(region);
            if let RegionId::Cue { index, .. } = region.id {
                surface.attach_badge(&region.id, &cue_badge(index));
                self.badges.insert(region.id);
            }
        }
        self.snapshot = Some(snapshot);
        self.rendered_zoom = Some(zoom);
        self.recreations += 1;
        debug!(track = %self.track, regions = self.rendered.len(), "Regions recreated");
        SyncOutcome::Recreated
    }

    /// Removes everything this synchronizer put on the surface. Badges go
    /// before the regions they're attached to.
    pub fn teardown(&mut self, surface: &mut dyn WaveformSurface) {
        for id in self.badges.drain() {
            surface.remove_badge(&id);
        }
        for region in self.rendered.drain(..) {
            surface.remove_region(&region.id);
        }
        self.snapshot = None;
        self.rendered_zoom = None;
    }
}

impl std::fmt::Debug for RegionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionSynchronizer")
            .field("track", &self.track)
            .field("regions", &self.rendered.len())
            .field("badges", &self.badges.len())
            .field("pending_commits", &self.has_pending_commits())
            .field("recreations", &self.recreations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::surface::{RecordingSurface, SurfaceCommand};
    use crate::tempo::TimeSignature;
    use crate::testutil::silent_buffer;

    const DELAY: Duration = Duration::from_millis(100);

    fn setup(mode: Mode) -> (Track, RegionSynchronizer, RecordingSurface) {
        let mut track = Track::new(
            TrackId::new(1),
            silent_buffer(10.0, 1000),
            120.0,
            TimeSignature::default(),
        );
        track.set_mode(mode);
        track.set_loop_bounds(2.0, 8.0);
        track.set_cue_point(0, 1.0).unwrap();
        track.set_cue_point(1, 3.0).unwrap();
        let sync = RegionSynchronizer::new(track.id(), 100.0, DELAY, false);
        (track, sync, RecordingSurface::default())
    }

    fn loop_id() -> RegionId {
        RegionId::Loop {
            track: TrackId::new(1),
        }
    }

    fn cue_id(index: usize) -> RegionId {
        RegionId::Cue {
            track: TrackId::new(1),
            index,
        }
    }

    #[test]
    fn test_initial_sync_creates_regions_and_badges() {
        let (track, mut sync, mut surface) = setup(Mode::Cue);
        assert_eq!(SyncOutcome::Recreated, sync.sync(&track, 1.0, &mut surface));
        assert_eq!(2, surface.regions.len());
        assert_eq!(Some(&"1".to_string()), surface.badges.get(&cue_id(0)));
        assert_eq!(Some(&"2".to_string()), surface.badges.get(&cue_id(1)));
        let region = surface.regions[&cue_id(1)];
        assert_eq!(300.0, region.start_px);
        assert!((region.end - 3.05).abs() < 1e-9);
    }

    #[test]
    fn test_unchanged_track_is_skipped() {
        let (track, mut sync, mut surface) = setup(Mode::Loop);
        sync.sync(&track, 1.0, &mut surface);
        surface.clear();
        for _ in 0..5 {
            assert_eq!(SyncOutcome::Skipped, sync.sync(&track, 1.0, &mut surface));
        }
        assert!(surface.commands.is_empty());
        assert_eq!(1, sync.recreations());
    }

    #[test]
    fn test_zoom_only_updates_geometry() {
        let (track, mut sync, mut surface) = setup(Mode::Loop);
        sync.sync(&track, 1.0, &mut surface);
        surface.clear();
        assert_eq!(SyncOutcome::Updated, sync.sync(&track, 2.0, &mut surface));
        assert_eq!(vec![SurfaceCommand::Update(loop_id())], surface.commands);
        assert_eq!(400.0, surface.regions[&loop_id()].start_px);
        assert_eq!(1, sync.recreations());
    }

    #[test]
    fn test_outside_change_recreates_with_badges_removed_first() {
        let (mut track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        surface.clear();

        track.set_cue_point(1, 4.0).unwrap();
        assert_eq!(SyncOutcome::Recreated, sync.sync(&track, 1.0, &mut surface));
        let first_remove = surface
            .commands
            .iter()
            .position(|command| matches!(command, SurfaceCommand::Remove(_)))
            .unwrap();
        let last_badge_removal = surface
            .commands
            .iter()
            .rposition(|command| matches!(command, SurfaceCommand::RemoveBadge(_)))
            .unwrap();
        assert!(last_badge_removal < first_remove);
        assert_eq!(2, sync.recreations());
        assert_eq!(4.0, surface.regions[&cue_id(1)].start);
    }

    #[test]
    fn test_drag_commits_once_after_debounce() {
        let (mut track, mut sync, mut surface) = setup(Mode::Loop);
        sync.sync(&track, 1.0, &mut surface);
        let start = Instant::now();

        sync.drag_start(loop_id()).unwrap();
        assert_eq!(GestureState::Dragging, sync.gesture_state(&loop_id()));
        assert_eq!(SyncOutcome::Deferred, sync.sync(&track, 1.0, &mut surface));

        sync.drag_end(loop_id(), 3.0, 6.0, &track, start).unwrap();
        sync.drag_end(loop_id(), 3.5, 6.5, &track, start + Duration::from_millis(40))
            .unwrap();
        assert_eq!(GestureState::Committing, sync.gesture_state(&loop_id()));

        assert!(sync
            .poll(start + Duration::from_millis(120), &mut track, &mut surface)
            .is_empty());
        assert_eq!((2.0, 8.0), track.loop_bounds());

        let committed = sync.poll(start + Duration::from_millis(140), &mut track, &mut surface);
        assert_eq!(vec![loop_id()], committed);
        assert_eq!((3.5, 6.5), track.loop_bounds());
        assert_eq!(GestureState::Idle, sync.gesture_state(&loop_id()));

        // The commit is already on the surface, so no rebuild follows.
        assert_eq!(SyncOutcome::Skipped, sync.sync(&track, 1.0, &mut surface));
        assert_eq!(1, sync.recreations());
        assert_eq!(350.0, surface.regions[&loop_id()].start_px);
    }

    #[test]
    fn test_change_during_drag_is_drawn_after_commit() {
        let (mut track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();

        sync.drag_start(cue_id(0)).unwrap();
        track.set_mode(Mode::Loop);
        assert_eq!(SyncOutcome::Deferred, sync.sync(&track, 1.0, &mut surface));
        sync.drag_end(cue_id(0), 1.5, 1.55, &track, now).unwrap();
        sync.poll(now + DELAY, &mut track, &mut surface);
        assert_eq!(1.5, track.cue_point(0).unwrap());

        assert_eq!(SyncOutcome::Recreated, sync.sync(&track, 1.0, &mut surface));
        assert_eq!(vec![loop_id()], surface.regions.keys().copied().collect::<Vec<_>>());
        assert!(surface.badges.is_empty());
    }

    #[test]
    fn test_other_cue_moved_during_drag_is_drawn_after_commit() {
        let (mut track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();

        sync.drag_start(cue_id(0)).unwrap();
        track.set_cue_point(1, 6.0).unwrap();
        sync.drag_end(cue_id(0), 1.5, 1.55, &track, now).unwrap();
        sync.poll(now + DELAY, &mut track, &mut surface);

        assert_eq!(SyncOutcome::Recreated, sync.sync(&track, 1.0, &mut surface));
        assert_eq!(1.5, surface.regions[&cue_id(0)].start);
        assert_eq!(6.0, surface.regions[&cue_id(1)].start);
    }

    #[test]
    fn test_short_loop_drag_is_corrected() {
        let (mut track, mut sync, mut surface) = setup(Mode::Loop);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();
        let bounds = sync.drag_end(loop_id(), 5.0, 5.02, &track, now).unwrap();
        assert!((bounds.1 - bounds.0 - 0.1).abs() < 1e-9);
        sync.flush(&mut track, &mut surface);
        let (start, end) = track.loop_bounds();
        assert!(end - start >= 0.1 - 1e-9);
    }

    #[test]
    fn test_cue_near_tail_is_clamped() {
        let (mut track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();
        let (start, end) = sync.drag_end(cue_id(0), 9.99, 10.0, &track, now).unwrap();
        assert!((start - 9.95).abs() < 1e-9);
        assert!(end <= 10.0);

        sync.poll(now + DELAY, &mut track, &mut surface);
        assert!((track.cue_point(0).unwrap() - 9.95).abs() < 1e-9);
    }

    #[test]
    fn test_same_cue_commit_twice_does_not_recreate() {
        let (mut track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();

        for round in 0..2u32 {
            let at = now + DELAY * (round * 2);
            sync.drag_start(cue_id(1)).unwrap();
            sync.drag_end(cue_id(1), 9.99, 10.0, &track, at).unwrap();
            sync.poll(at + DELAY, &mut track, &mut surface);
            assert_eq!(SyncOutcome::Skipped, sync.sync(&track, 1.0, &mut surface));
        }
        assert_eq!(1, sync.recreations());
        assert_eq!(2, surface.creates());
    }

    #[test]
    fn test_separate_cues_commit_independently() {
        let (mut track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();
        sync.drag_start(cue_id(0)).unwrap();
        sync.drag_start(cue_id(1)).unwrap();
        sync.drag_end(cue_id(0), 1.5, 1.55, &track, now).unwrap();
        assert_eq!(GestureState::Dragging, sync.gesture_state(&cue_id(1)));
        sync.drag_end(cue_id(1), 3.5, 3.55, &track, now + Duration::from_millis(50))
            .unwrap();

        let committed = sync.poll(now + DELAY, &mut track, &mut surface);
        assert_eq!(vec![cue_id(0)], committed);
        assert_eq!(3.0, track.cue_point(1).unwrap());
        sync.poll(now + DELAY * 2, &mut track, &mut surface);
        assert_eq!(3.5, track.cue_point(1).unwrap());
    }

    #[test]
    fn test_snap_to_grid() {
        let (mut track, mut sync, mut surface) = setup(Mode::Loop);
        sync.set_snap_to_grid(true);
        sync.sync(&track, 1.0, &mut surface);
        let now = Instant::now();
        // Beats are 0.5s apart at 120 BPM.
        let bounds = sync.drag_end(loop_id(), 2.2, 4.8, &track, now).unwrap();
        assert_eq!((2.0, 5.0), bounds);
        sync.flush(&mut track, &mut surface);
        assert_eq!((2.0, 5.0), track.loop_bounds());
    }

    #[test]
    fn test_foreign_region_is_rejected() {
        let (track, mut sync, _) = setup(Mode::Loop);
        let other = RegionId::Loop {
            track: TrackId::new(2),
        };
        assert!(matches!(
            sync.drag_start(other),
            Err(WorkstationError::InvalidRegion(_))
        ));
        assert!(sync
            .drag_end(other, 0.0, 1.0, &track, Instant::now())
            .is_err());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (track, mut sync, mut surface) = setup(Mode::Cue);
        sync.sync(&track, 1.0, &mut surface);
        sync.teardown(&mut surface);
        assert!(surface.regions.is_empty());
        assert!(surface.badges.is_empty());
        surface.clear();
        sync.teardown(&mut surface);
        assert!(surface.commands.is_empty());
    }

    #[test]
    fn test_badges_follow_digit_keys() {
        assert_eq!("1", cue_badge(0));
        assert_eq!("9", cue_badge(8));
        assert_eq!("0", cue_badge(9));
    }
}
