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

//! The public face of the sample deck.
//!
//! A [`Workstation`] owns the tracks, the graph controller and one scheduler
//! and region synchronizer per track. Everything runs on the caller's thread;
//! the only other threads are the render path and the frame loop. Time is
//! passed in explicitly, either as engine time read from the engine or as an
//! [`Instant`] handed to [`Workstation::pump`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::Notify;
use tracing::{debug, info, span, warn, Level, Span};

use crate::audio::{decode, ChainSettings, DecodedBuffer, EngineHandle, FilterSettings};
use crate::config::{ConfigError, Intervals, WorkstationConfig};
use crate::error::WorkstationError;
use crate::playback::{AudioGraphController, FrameLoop, PlaybackScheduler, PlaybackSession, SessionId};
use crate::regions::{
    CueKeyboard, DebouncedCommit, RegionId, RegionSynchronizer, SyncOutcome, WaveformSurface,
};
use crate::tempo::{grid, speed, GridLine, GridResolution, TapTempo, TimeSignature};
use crate::track::{Mode, Track, TrackId};
use crate::waveform::{self, Peak};

/// Events for whatever is presenting the workstation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TrackLoaded { track: TrackId, duration: f64 },
    PositionChanged { track: TrackId, position: f64 },
    PlayingChanged { track: TrackId, playing: bool },
    RegionsChanged { track: TrackId },
    TempoChanged { track: TrackId, bpm: f64 },
    CueSelected { track: Option<TrackId> },
}

/// Workstation settings.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub intervals: Intervals,
    pub base_pixels_per_second: f64,
    pub zoom: f64,
    /// Chain settings given to newly loaded tracks.
    pub defaults: ChainSettings,
    pub snap_to_grid: bool,
}

impl Options {
    pub fn from_config(config: &WorkstationConfig) -> Result<Options, ConfigError> {
        Ok(Options {
            intervals: config.timing().intervals()?,
            base_pixels_per_second: config.view().base_pixels_per_second(),
            zoom: config.view().zoom(),
            defaults: config.defaults().chain_settings(),
            snap_to_grid: config.regions().snap_to_grid(),
        })
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            intervals: Intervals::default(),
            base_pixels_per_second: 100.0,
            zoom: 1.0,
            defaults: ChainSettings::default(),
            snap_to_grid: false,
        }
    }
}

/// Everything the workstation keeps per track.
struct TrackSlot {
    track: Track,
    /// The chain settings the user has dialled in, applied to each new session.
    settings: ChainSettings,
    session: Option<PlaybackSession>,
    scheduler: PlaybackScheduler,
    regions: RegionSynchronizer,
    tap: TapTempo,
    zoom: f64,
    scrub: f64,
    /// Filter changes waiting to reach the live chain.
    filter_commit: DebouncedCommit<FilterSettings>,
}

/// Drops stale session errors; the newer session already reflects intent.
fn ignore_stale(result: Result<(), WorkstationError>) -> Result<(), WorkstationError> {
    match result {
        Err(WorkstationError::StaleSessionOp(session)) => {
            debug!(session = %session, "Ignored operation on superseded session");
            Ok(())
        }
        other => other,
    }
}

pub struct Workstation<S: WaveformSurface> {
    span: Span,
    engine: EngineHandle,
    controller: AudioGraphController,
    surface: S,
    options: Options,
    tracks: BTreeMap<TrackId, TrackSlot>,
    next_track: u64,
    keyboard: CueKeyboard,
    frames: Option<FrameLoop>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
}

impl<S: WaveformSurface> Workstation<S> {
    pub fn new(engine: EngineHandle, surface: S, options: Options) -> Workstation<S> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Workstation {
            span: span!(Level::INFO, "workstation"),
            controller: AudioGraphController::new(engine.clone()),
            engine,
            surface,
            options,
            tracks: BTreeMap::new(),
            next_track: 1,
            keyboard: CueKeyboard::default(),
            frames: None,
            events_tx,
            events_rx,
        }
    }

    /// A receiver for workstation events.
    pub fn events(&self) -> Receiver<Event> {
        self.events_rx.clone()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id).map(|slot| &slot.track)
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    /// The chain settings that the next session on this track will use.
    pub fn settings(&self, id: TrackId) -> Result<ChainSettings, WorkstationError> {
        Ok(self.slot(id)?.settings)
    }

    fn emit(&self, event: Event) {
        // The receiver lives in self, so this can't fail.
        let _ = self.events_tx.send(event);
    }

    fn slot(&self, id: TrackId) -> Result<&TrackSlot, WorkstationError> {
        self.tracks.get(&id).ok_or(WorkstationError::UnknownTrack(id))
    }

    fn slot_mut(&mut self, id: TrackId) -> Result<&mut TrackSlot, WorkstationError> {
        self.tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))
    }

    /// Redraws the regions for a track if its loop or cue values changed.
    fn sync_regions(&mut self, id: TrackId) -> Result<SyncOutcome, WorkstationError> {
        let slot = self
            .tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))?;
        let outcome = slot.regions.sync(&slot.track, slot.zoom, &mut self.surface);
        if outcome == SyncOutcome::Recreated {
            self.emit(Event::RegionsChanged { track: id });
        }
        Ok(outcome)
    }

    /// Adds a decoded buffer as a new track.
    pub fn load_track(
        &mut self,
        buffer: DecodedBuffer,
        tempo: f64,
        time_signature: TimeSignature,
    ) -> TrackId {
        let span = self.span.clone();
        let _enter = span.enter();

        let id = TrackId::new(self.next_track);
        self.next_track += 1;

        let track = Track::new(id, buffer, tempo, time_signature);
        let duration = track.duration();
        info!(
            track = %id,
            duration,
            sample_rate = track.buffer().sample_rate(),
            channels = track.buffer().channel_count(),
            tempo = track.tempo(),
            "Track loaded"
        );

        let slot = TrackSlot {
            settings: self.options.defaults,
            session: None,
            scheduler: PlaybackScheduler::new(
                self.engine.clone(),
                self.options.intervals.position_publish,
            ),
            regions: RegionSynchronizer::new(
                id,
                self.options.base_pixels_per_second,
                self.options.intervals.region_commit,
                self.options.snap_to_grid,
            ),
            tap: TapTempo::new(),
            zoom: self.options.zoom,
            scrub: 0.0,
            filter_commit: DebouncedCommit::new(self.options.intervals.param_commit),
            track,
        };
        self.tracks.insert(id, slot);
        self.emit(Event::TrackLoaded {
            track: id,
            duration,
        });
        // Only fails for unknown tracks.
        let _ = self.sync_regions(id);
        id
    }

    /// Decodes a file and loads it as a new track.
    pub fn load_file(
        &mut self,
        path: &Path,
        tempo: f64,
        time_signature: TimeSignature,
    ) -> Result<TrackId, WorkstationError> {
        let buffer = decode::decode_file(path).map_err(|e| {
            warn!(path = ?path, err = %e, "Track failed to load");
            WorkstationError::Decode(e)
        })?;
        Ok(self.load_track(buffer, tempo, time_signature))
    }

    /// Stops and removes a track. Pending region commits are applied first.
    pub fn remove_track(&mut self, id: TrackId) -> Result<(), WorkstationError> {
        self.stop(id)?;
        if let Some(mut slot) = self.tracks.remove(&id) {
            slot.regions.flush(&mut slot.track, &mut self.surface);
            slot.regions.teardown(&mut self.surface);
        }
        self.keyboard.deselect(id);
        info!(track = %id, "Track removed");
        Ok(())
    }

    pub fn set_mode(&mut self, id: TrackId, mode: Mode) -> Result<(), WorkstationError> {
        let changed = self.slot_mut(id)?.track.set_mode(mode);
        if changed {
            debug!(track = %id, mode = %mode, "Mode changed");
            self.stop(id)?;
            self.sync_regions(id)?;
        }
        Ok(())
    }

    /// Sets the loop bounds, correcting them if needed. Returns the stored bounds.
    pub fn set_loop_bounds(
        &mut self,
        id: TrackId,
        start: f64,
        end: f64,
    ) -> Result<(f64, f64), WorkstationError> {
        let slot = self
            .tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))?;
        slot.track.set_loop_bounds(start, end);
        let bounds = slot.track.loop_bounds();
        if let Some(session) = slot.session.as_mut() {
            if session.mode() == Mode::Loop {
                ignore_stale(self.controller.set_loop_bounds(session, bounds.0, bounds.1))?;
            }
        }
        self.sync_regions(id)?;
        Ok(bounds)
    }

    /// Sets or appends a cue point. Returns the stored time.
    pub fn set_cue_point(
        &mut self,
        id: TrackId,
        index: usize,
        time: f64,
    ) -> Result<f64, WorkstationError> {
        let slot = self.slot_mut(id)?;
        slot.track.set_cue_point(index, time)?;
        let stored = slot.track.cue_point(index).unwrap_or(0.0);
        self.sync_regions(id)?;
        Ok(stored)
    }

    pub fn remove_cue_point(&mut self, id: TrackId, index: usize) -> Result<(), WorkstationError> {
        self.slot_mut(id)?.track.remove_cue_point(index)?;
        self.sync_regions(id)?;
        Ok(())
    }

    /// Sets the track tempo. The speed ratio is pulled back into range if the
    /// new tempo would push the effective tempo out of bounds.
    pub fn set_tempo(&mut self, id: TrackId, bpm: f64) -> Result<f64, WorkstationError> {
        let slot = self.slot_mut(id)?;
        let tempo = slot.track.set_tempo(bpm);
        let ratio = slot.settings.speed_ratio;
        self.emit(Event::TempoChanged { track: id, bpm: tempo });
        self.set_speed(id, ratio)?;
        Ok(tempo)
    }

    pub fn set_time_signature(
        &mut self,
        id: TrackId,
        time_signature: TimeSignature,
    ) -> Result<(), WorkstationError> {
        self.slot_mut(id)?.track.set_time_signature(time_signature);
        Ok(())
    }

    pub fn set_first_measure_time(&mut self, id: TrackId, time: f64) -> Result<(), WorkstationError> {
        self.slot_mut(id)?.track.set_first_measure_time(time);
        Ok(())
    }

    /// Updates any of the filter fields. A live chain picks the change up
    /// once the parameter debounce passes, see [`Workstation::pump`].
    pub fn set_filter(
        &mut self,
        id: TrackId,
        lowpass_hz: Option<f32>,
        highpass_hz: Option<f32>,
        enabled: Option<bool>,
        now: Instant,
    ) -> Result<FilterSettings, WorkstationError> {
        let slot = self.slot_mut(id)?;
        let filter = &mut slot.settings.filter;
        if let Some(lowpass_hz) = lowpass_hz {
            filter.lowpass_hz = lowpass_hz;
        }
        if let Some(highpass_hz) = highpass_hz {
            filter.highpass_hz = highpass_hz;
        }
        if let Some(enabled) = enabled {
            filter.enabled = enabled;
        }
        let filter = *filter;
        if slot.session.is_some() {
            slot.filter_commit.schedule(filter, now);
        }
        Ok(filter)
    }

    /// Sets the gain, applied to a live chain at once.
    pub fn set_volume(&mut self, id: TrackId, gain: f32) -> Result<f32, WorkstationError> {
        let slot = self
            .tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))?;
        let gain = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        slot.settings.gain = gain;
        if let Some(session) = slot.session.as_ref() {
            ignore_stale(self.controller.set_gain(session, gain))?;
        }
        Ok(gain)
    }

    /// Sets the speed ratio, clamped so that both the ratio and the effective
    /// tempo stay in range. Returns the stored ratio.
    pub fn set_speed(&mut self, id: TrackId, ratio: f64) -> Result<f64, WorkstationError> {
        let slot = self
            .tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))?;
        let ratio = speed::clamp_speed(slot.track.tempo(), ratio);
        slot.settings.speed_ratio = ratio;
        if let Some(session) = slot.session.as_mut() {
            ignore_stale(self.controller.set_speed(session, ratio))?;
        }
        Ok(ratio)
    }

    /// Sets the speed ratio that plays the track at `bpm`.
    pub fn set_target_tempo(&mut self, id: TrackId, bpm: f64) -> Result<f64, WorkstationError> {
        let tempo = self.slot(id)?.track.tempo();
        self.set_speed(id, speed::speed_ratio(bpm, tempo))
    }

    /// The tempo the track is heard at.
    pub fn effective_tempo(&self, id: TrackId) -> Result<u32, WorkstationError> {
        let slot = self.slot(id)?;
        Ok(speed::effective_tempo(
            slot.track.tempo(),
            slot.settings.speed_ratio,
        ))
    }

    /// The speed adjustment worth about one BPM on this track.
    pub fn speed_step(&self, id: TrackId) -> Result<f64, WorkstationError> {
        Ok(speed::speed_step(self.slot(id)?.track.tempo()))
    }

    /// Records a tap at `at_ms`. Once enough taps are in, the track tempo
    /// follows them and the new tempo is returned.
    pub fn tap_tempo(&mut self, id: TrackId, at_ms: f64) -> Result<Option<f64>, WorkstationError> {
        let bpm = self.slot_mut(id)?.tap.tap(at_ms);
        match bpm {
            Some(bpm) => {
                debug!(track = %id, bpm, "Tap tempo");
                Ok(Some(self.set_tempo(id, bpm as f64)?))
            }
            None => Ok(None),
        }
    }

    /// Moves the preview position. A running preview restarts from there.
    pub fn seek(&mut self, id: TrackId, time: f64) -> Result<f64, WorkstationError> {
        let slot = self.slot_mut(id)?;
        let duration = slot.track.duration();
        let time = if time.is_finite() {
            time.clamp(0.0, duration)
        } else {
            0.0
        };
        slot.scrub = time;
        slot.scheduler.publish_now(id, time);
        let restart = slot
            .session
            .as_ref()
            .is_some_and(|session| session.mode() == Mode::Preview);
        self.emit(Event::PositionChanged {
            track: id,
            position: time,
        });
        if restart {
            self.start_session(id, Mode::Preview, time)?;
        }
        Ok(time)
    }

    /// The zoom level for a track's regions.
    pub fn set_zoom(&mut self, id: TrackId, zoom: f64) -> Result<(), WorkstationError> {
        let slot = self.slot_mut(id)?;
        if zoom.is_finite() && zoom > 0.0 {
            slot.zoom = zoom;
        }
        self.sync_regions(id)?;
        Ok(())
    }

    pub fn zoom(&self, id: TrackId) -> Result<f64, WorkstationError> {
        Ok(self.slot(id)?.zoom)
    }

    /// The track's tempo grid, each line paired with its pixel offset at the
    /// track's zoom.
    pub fn grid_lines(
        &self,
        id: TrackId,
        resolution: GridResolution,
    ) -> Result<Vec<(GridLine, f64)>, WorkstationError> {
        let slot = self.slot(id)?;
        let base = self.options.base_pixels_per_second;
        Ok(slot
            .track
            .grid_params()
            .lines(resolution)
            .into_iter()
            .map(|line| (line, grid::time_to_pixels(line.time, base, slot.zoom)))
            .collect())
    }

    /// Min/max peaks of the track, one per pixel at the track's zoom.
    pub fn waveform_peaks(&self, id: TrackId) -> Result<Vec<Peak>, WorkstationError> {
        let slot = self.slot(id)?;
        Ok(waveform::peaks_for_zoom(
            slot.track.buffer(),
            self.options.base_pixels_per_second,
            slot.zoom,
        ))
    }

    fn start_session(
        &mut self,
        id: TrackId,
        mode: Mode,
        trigger_point: f64,
    ) -> Result<SessionId, WorkstationError> {
        let span = self.span.clone();
        let _enter = span.enter();

        let slot = self
            .tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))?;
        let session = self
            .controller
            .start(&slot.track, mode, trigger_point, slot.settings)?;
        let session_id = session.id();
        let was_playing = slot.session.replace(session).is_some();
        // A pending filter change already went into the new chain's settings.
        slot.filter_commit.cancel();
        slot.scheduler.reset();

        if self.frames.is_none() {
            self.frames = Some(FrameLoop::start(self.options.intervals.frame));
        }
        if !was_playing {
            self.emit(Event::PlayingChanged {
                track: id,
                playing: true,
            });
        }
        Ok(session_id)
    }

    /// Starts playback. Without a trigger point, loop mode starts at the loop
    /// start, cue mode at the first cue and preview mode at the scrub position.
    pub fn play(&mut self, id: TrackId, trigger_point: Option<f64>) -> Result<SessionId, WorkstationError> {
        let slot = self.slot(id)?;
        let mode = slot.track.mode();
        let trigger_point = trigger_point.unwrap_or(match mode {
            Mode::Loop => slot.track.loop_bounds().0,
            Mode::Cue => slot.track.cue_point(0).unwrap_or(0.0),
            Mode::Preview => slot.scrub,
        });
        self.start_session(id, mode, trigger_point)
    }

    /// Plays from a cue point as a one-shot.
    pub fn trigger_cue(&mut self, id: TrackId, index: usize) -> Result<SessionId, WorkstationError> {
        let time = self
            .slot(id)?
            .track
            .cue_point(index)
            .ok_or(WorkstationError::UnknownCue { track: id, index })?;
        debug!(track = %id, index, time, "Cue triggered");
        self.start_session(id, Mode::Cue, time)
    }

    /// Stops playback on a track. Returns false if nothing was playing.
    pub fn stop(&mut self, id: TrackId) -> Result<bool, WorkstationError> {
        let slot = self
            .tracks
            .get_mut(&id)
            .ok_or(WorkstationError::UnknownTrack(id))?;
        let session = match slot.session.take() {
            Some(session) => session,
            None => return Ok(false),
        };
        self.controller.stop(&session);
        // Region commits from finished drags still land; parameter pushes for
        // the stopped chain don't.
        if let Some(filter) = slot.filter_commit.cancel() {
            debug!(track = %id, filter = ?filter, "Dropped pending filter change");
        }
        slot.scheduler.reset();

        if self.tracks.values().all(|slot| slot.session.is_none()) {
            if let Some(mut frames) = self.frames.take() {
                frames.cancel();
            }
        }
        self.emit(Event::PlayingChanged {
            track: id,
            playing: false,
        });
        Ok(true)
    }

    /// Stops every track.
    pub fn stop_all(&mut self) {
        for id in self.track_ids() {
            let _ = self.stop(id);
        }
    }

    pub fn is_playing(&self, id: TrackId) -> bool {
        self.tracks
            .get(&id)
            .is_some_and(|slot| slot.session.is_some())
    }

    /// The session playing on a track.
    pub fn session(&self, id: TrackId) -> Option<&PlaybackSession> {
        self.tracks.get(&id).and_then(|slot| slot.session.as_ref())
    }

    /// Where playback is now, or the scrub position when stopped.
    pub fn current_position(&self, id: TrackId) -> Result<f64, WorkstationError> {
        let slot = self.slot(id)?;
        Ok(match slot.session.as_ref() {
            Some(session) => slot.scheduler.current_position(session),
            None => slot.scrub,
        })
    }

    /// Registers a callback for a track's published positions.
    pub fn on_position_change<F>(&mut self, id: TrackId, listener: F) -> Result<(), WorkstationError>
    where
        F: FnMut(TrackId, f64) + Send + 'static,
    {
        self.slot_mut(id)?.scheduler.on_position_change(listener);
        Ok(())
    }

    /// Makes a track the one that digit keys trigger, or clears the selection.
    pub fn select_cue_track(&mut self, id: Option<TrackId>) -> Result<(), WorkstationError> {
        match id {
            Some(id) => {
                self.slot(id)?;
                self.keyboard.select(id);
            }
            None => {
                if let Some(selected) = self.keyboard.selected() {
                    self.keyboard.deselect(selected);
                }
            }
        }
        self.emit(Event::CueSelected {
            track: self.keyboard.selected(),
        });
        Ok(())
    }

    pub fn selected_cue_track(&self) -> Option<TrackId> {
        self.keyboard.selected()
    }

    /// Handles a digit key. Returns the started session, if the key mapped to
    /// a cue on the selected cue track.
    pub fn key_pressed(&mut self, key: char) -> Result<Option<SessionId>, WorkstationError> {
        let resolved = self
            .keyboard
            .resolve(key, |id| self.tracks.get(&id).map(|slot| slot.track.mode()));
        let (id, index) = match resolved {
            Some(resolved) => resolved,
            None => return Ok(None),
        };
        match self.trigger_cue(id, index) {
            Ok(session) => Ok(Some(session)),
            Err(WorkstationError::UnknownCue { .. }) => {
                debug!(track = %id, index, "No cue on key");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn drag_start(&mut self, region: RegionId) -> Result<(), WorkstationError> {
        self.slot_mut(region.track())?.regions.drag_start(region)
    }

    /// A region was released. Returns the corrected bounds that will be
    /// committed once the region debounce passes.
    pub fn drag_end(
        &mut self,
        region: RegionId,
        start: f64,
        end: f64,
        now: Instant,
    ) -> Result<(f64, f64), WorkstationError> {
        let slot = self.slot_mut(region.track())?;
        slot.regions.drag_end(region, start, end, &slot.track, now)
    }

    /// Runs one frame: lands due commits, advances positions, handles
    /// natural ends and redraws regions that changed.
    pub fn pump(&mut self, now: Instant) {
        let span = self.span.clone();
        let _enter = span.enter();

        let mut ended = Vec::new();
        let mut events = Vec::new();
        for (id, slot) in self.tracks.iter_mut() {
            let committed = slot.regions.poll(now, &mut slot.track, &mut self.surface);
            if !committed.is_empty() {
                events.push(Event::RegionsChanged { track: *id });
                let bounds = slot.track.loop_bounds();
                let loop_committed = committed
                    .iter()
                    .any(|region| matches!(region, RegionId::Loop { .. }));
                if let Some(session) = slot.session.as_mut() {
                    if loop_committed && session.mode() == Mode::Loop {
                        let _ = ignore_stale(self.controller.set_loop_bounds(
                            session, bounds.0, bounds.1,
                        ));
                    }
                }
            }

            if let Some(filter) = slot.filter_commit.poll(now) {
                if let Some(session) = slot.session.as_ref() {
                    let _ = ignore_stale(self.controller.set_filter(
                        session,
                        Some(filter.lowpass_hz),
                        Some(filter.highpass_hz),
                        Some(filter.enabled),
                    ));
                }
            }

            if let Some(session) = slot.session.as_ref() {
                let update = slot.scheduler.tick(session);
                if update.published {
                    events.push(Event::PositionChanged {
                        track: *id,
                        position: update.position,
                    });
                }
                if update.ended {
                    ended.push(*id);
                }
            }

            if slot.regions.sync(&slot.track, slot.zoom, &mut self.surface)
                == SyncOutcome::Recreated
            {
                events.push(Event::RegionsChanged { track: *id });
            }
        }

        for event in events {
            self.emit(event);
        }
        for id in ended {
            debug!(track = %id, "Playback reached the end of the buffer");
            let _ = self.stop(id);
        }
    }

    /// Pumps if the frame loop has ticked since the last call. Returns true if
    /// it did.
    pub fn run_frame(&mut self) -> bool {
        let tick = self.frames.as_ref().and_then(FrameLoop::try_tick);
        match tick {
            Some(now) => {
                self.pump(now);
                true
            }
            None => false,
        }
    }

    /// Blocks until the next frame tick or `timeout`, then pumps. Returns false
    /// if no tick came, which is always the case while nothing plays.
    pub fn wait_frame(&mut self, timeout: Duration) -> bool {
        let tick = match self.frames.as_ref() {
            Some(frames) => frames.ticks().recv_timeout(timeout).ok(),
            None => None,
        };
        match tick {
            Some(now) => {
                self.pump(now);
                true
            }
            None => false,
        }
    }

    /// Wakes once per frame tick while anything plays. None while idle.
    pub fn frame_notifier(&self) -> Option<Arc<Notify>> {
        self.frames
            .as_ref()
            .filter(|frames| frames.is_running())
            .map(FrameLoop::notifier)
    }

    /// True while the frame loop is running, i.e. while anything plays.
    pub fn frame_loop_running(&self) -> bool {
        self.frames.as_ref().is_some_and(FrameLoop::is_running)
    }
}

impl<S: WaveformSurface> Drop for Workstation<S> {
    fn drop(&mut self) {
        self.stop_all();
        for slot in self.tracks.values_mut() {
            slot.regions.flush(&mut slot.track, &mut self.surface);
            slot.regions.teardown(&mut self.surface);
        }
    }
}

impl<S: WaveformSurface> std::fmt::Debug for Workstation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workstation")
            .field("engine", &self.engine.to_string())
            .field("tracks", &self.tracks.len())
            .field("selected_cue_track", &self.keyboard.selected())
            .field("frame_loop", &self.frame_loop_running())
            .finish()
    }
}
