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
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::{PlaybackSession, SessionId};
use crate::audio::{
    Chain, ChainParams, ChainSettings, EngineHandle, EngineState, FilterSettings, Playback,
};
use crate::error::WorkstationError;
use crate::track::{Mode, Track, TrackId};

/// Owns every live signal chain. At most one chain per track is live; starting
/// a new one stops the old one first.
pub struct AudioGraphController {
    engine: EngineHandle,
    live: HashMap<TrackId, (SessionId, Arc<ChainParams>)>,
    next_id: u64,
}

impl AudioGraphController {
    pub fn new(engine: EngineHandle) -> AudioGraphController {
        AudioGraphController {
            engine,
            live: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// The live session for a track, if any.
    pub fn live_session(&self, track: TrackId) -> Option<SessionId> {
        self.live.get(&track).map(|(id, _)| *id)
    }

    /// Number of live chains across all tracks.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, session: &PlaybackSession) -> bool {
        self.live_session(session.track_id()) == Some(session.id()) && !session.is_stopped()
    }

    /// Builds a chain for the track and starts it at `trigger_point`.
    ///
    /// Loop mode wraps inside the track's loop bounds. Preview and cue modes
    /// play once to the end of the buffer.
    pub fn start(
        &mut self,
        track: &Track,
        mode: Mode,
        trigger_point: f64,
        settings: ChainSettings,
    ) -> Result<PlaybackSession, WorkstationError> {
        if self.engine.state() != EngineState::Running {
            return Err(WorkstationError::EngineNotReady);
        }

        self.stop_track(track.id());

        let duration = track.duration();
        let trigger_point = if trigger_point.is_finite() && (0.0..duration).contains(&trigger_point) {
            trigger_point
        } else {
            0.0
        };
        let loop_bounds = track.loop_bounds();
        // A loop plays from inside its bounds.
        let trigger_point = if mode == Mode::Loop
            && !(loop_bounds.0..loop_bounds.1).contains(&trigger_point)
        {
            loop_bounds.0
        } else {
            trigger_point
        };
        let params = Arc::new(ChainParams::new(settings, loop_bounds.0, loop_bounds.1));
        let raw_id = self.next_id;
        self.next_id += 1;
        let id = SessionId::new(raw_id);

        let playback = if mode == Mode::Loop {
            Playback::Looping
        } else {
            Playback::OneShot
        };
        let chain = Chain::new(
            raw_id,
            track.buffer().clone(),
            params.clone(),
            playback,
            trigger_point,
            self.engine.sample_rate(),
            self.engine.channels(),
        );
        let started_at = self.engine.current_time();
        self.engine.connect(chain)?;
        self.live.insert(track.id(), (id, params.clone()));

        info!(
            session = %id,
            track = %track.id(),
            mode = %mode,
            trigger_point,
            topology = ?params.topology(),
            "Session started"
        );

        Ok(PlaybackSession::new(
            id,
            track.id(),
            mode,
            trigger_point,
            duration,
            started_at,
            settings.speed_ratio,
            loop_bounds,
            params,
        ))
    }

    fn check_live(&self, session: &PlaybackSession) -> Result<(), WorkstationError> {
        if self.is_live(session) {
            Ok(())
        } else {
            Err(WorkstationError::StaleSessionOp(session.id()))
        }
    }

    pub fn set_gain(&self, session: &PlaybackSession, gain: f32) -> Result<(), WorkstationError> {
        self.check_live(session)?;
        session.params().set_gain(gain);
        Ok(())
    }

    pub fn set_speed(
        &self,
        session: &mut PlaybackSession,
        speed_ratio: f64,
    ) -> Result<(), WorkstationError> {
        self.check_live(session)?;
        session.change_speed(speed_ratio, self.engine.current_time());
        session.params().set_speed(speed_ratio);
        Ok(())
    }

    /// Updates any of the filter fields in place.
    pub fn set_filter(
        &self,
        session: &PlaybackSession,
        lowpass_hz: Option<f32>,
        highpass_hz: Option<f32>,
        enabled: Option<bool>,
    ) -> Result<(), WorkstationError> {
        self.check_live(session)?;
        let current = session.params().filter();
        session.params().set_filter(FilterSettings {
            lowpass_hz: lowpass_hz.unwrap_or(current.lowpass_hz),
            highpass_hz: highpass_hz.unwrap_or(current.highpass_hz),
            enabled: enabled.unwrap_or(current.enabled),
        });
        Ok(())
    }

    /// Moves the loop of a running loop session.
    pub fn set_loop_bounds(
        &self,
        session: &mut PlaybackSession,
        start: f64,
        end: f64,
    ) -> Result<(), WorkstationError> {
        self.check_live(session)?;
        session.change_loop_bounds((start, end), self.engine.current_time());
        session.params().set_loop_bounds(start, end);
        Ok(())
    }

    /// Stops a session. Returns false if it was already stopped.
    pub fn stop(&mut self, session: &PlaybackSession) -> bool {
        if self.live_session(session.track_id()) == Some(session.id()) {
            self.live.remove(&session.track_id());
        }
        let stopped = session.params().cancel();
        if stopped {
            info!(session = %session.id(), track = %session.track_id(), "Session stopped");
        }
        stopped
    }

    /// Stops whatever is live on a track.
    pub fn stop_track(&mut self, track: TrackId) -> Option<SessionId> {
        let (id, params) = self.live.remove(&track)?;
        if params.cancel() {
            debug!(session = %id, track = %track, "Superseded session stopped");
        }
        Some(id)
    }

    /// Stops every live session.
    pub fn stop_all(&mut self) {
        for (track, (id, params)) in self.live.drain() {
            if params.cancel() {
                debug!(session = %id, track = %track, "Session stopped");
            }
        }
    }
}

impl Drop for AudioGraphController {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for AudioGraphController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphController")
            .field("engine", &self.engine.to_string())
            .field("live", &self.live.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::{mock, Engine, Node};
    use crate::tempo::TimeSignature;
    use crate::testutil::{constant_buffer, silent_buffer};

    fn setup() -> (Arc<mock::Engine>, AudioGraphController, Track) {
        let engine = Arc::new(mock::Engine::new("mock", 1000, 2, 50));
        engine.resume().unwrap();
        let controller = AudioGraphController::new(engine.clone());
        let track = Track::new(
            TrackId::new(1),
            constant_buffer(0.5, 4000, 1000),
            120.0,
            TimeSignature::default(),
        );
        (engine, controller, track)
    }

    #[test]
    fn test_start_requires_running_engine() {
        let engine = Arc::new(mock::Engine::new("mock", 1000, 2, 50));
        let mut controller = AudioGraphController::new(engine.clone());
        let track = Track::new(
            TrackId::new(1),
            silent_buffer(1.0, 1000),
            120.0,
            TimeSignature::default(),
        );
        assert!(matches!(
            controller.start(&track, Mode::Preview, 0.0, ChainSettings::default()),
            Err(WorkstationError::EngineNotReady)
        ));
        assert_eq!(None, controller.live_session(track.id()));
        assert_eq!(0, engine.active_chains());
    }

    #[test]
    fn test_restart_leaves_one_live_session() {
        let (engine, mut controller, track) = setup();
        let first = controller
            .start(&track, Mode::Loop, 0.0, ChainSettings::default())
            .unwrap();
        let second = controller
            .start(&track, Mode::Loop, 0.0, ChainSettings::default())
            .unwrap();

        assert_ne!(first.id(), second.id());
        assert!(first.is_stopped());
        assert!(!controller.is_live(&first));
        assert!(controller.is_live(&second));
        assert_eq!(1, controller.live_count());

        // Only one chain is heard: a doubled chain would read 1.0.
        let output = engine.render(10);
        assert!(output.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert_eq!(1, engine.active_chains());
    }

    #[test]
    fn test_topology_with_and_without_filters() {
        let (_engine, mut controller, track) = setup();
        let session = controller
            .start(&track, Mode::Preview, 0.0, ChainSettings::default())
            .unwrap();
        assert_eq!(vec![Node::Source, Node::Gain, Node::Output], session.topology());

        let settings = ChainSettings {
            filter: FilterSettings {
                enabled: true,
                ..FilterSettings::default()
            },
            ..ChainSettings::default()
        };
        let session = controller
            .start(&track, Mode::Preview, 0.0, settings)
            .unwrap();
        assert_eq!(
            vec![
                Node::Source,
                Node::Highpass,
                Node::Lowpass,
                Node::Gain,
                Node::Output
            ],
            session.topology()
        );
    }

    #[test]
    fn test_live_parameter_changes() {
        let (engine, mut controller, track) = setup();
        let mut session = controller
            .start(&track, Mode::Preview, 0.0, ChainSettings::default())
            .unwrap();

        controller.set_gain(&session, 0.25).unwrap();
        let output = engine.render(10);
        assert!(output.iter().all(|s| (*s - 0.125).abs() < 1e-6));

        engine.advance(1.0);
        controller.set_speed(&mut session, 2.0).unwrap();
        engine.advance(0.5);
        let position = session.position_at(engine.current_time()).0;
        assert!((position - 2.01).abs() < 1e-9);

        controller
            .set_filter(&session, Some(5000.0), None, Some(true))
            .unwrap();
        let filter = session.params().filter();
        assert_eq!(5000.0, filter.lowpass_hz);
        assert_eq!(20.0, filter.highpass_hz);
        assert!(filter.enabled);
    }

    #[test]
    fn test_stale_session_ops() {
        let (_engine, mut controller, track) = setup();
        let mut old = controller
            .start(&track, Mode::Preview, 0.0, ChainSettings::default())
            .unwrap();
        let _new = controller
            .start(&track, Mode::Preview, 0.0, ChainSettings::default())
            .unwrap();

        assert!(matches!(
            controller.set_gain(&old, 0.1),
            Err(WorkstationError::StaleSessionOp(id)) if id == old.id()
        ));
        assert!(matches!(
            controller.set_speed(&mut old, 1.5),
            Err(WorkstationError::StaleSessionOp(_))
        ));
        assert!(matches!(
            controller.set_filter(&old, None, None, Some(true)),
            Err(WorkstationError::StaleSessionOp(_))
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (engine, mut controller, track) = setup();
        let session = controller
            .start(&track, Mode::Cue, 1.0, ChainSettings::default())
            .unwrap();
        assert!(controller.stop(&session));
        assert!(!controller.stop(&session));
        assert_eq!(None, controller.live_session(track.id()));

        engine.render(10);
        assert_eq!(0, engine.active_chains());
    }

    #[test]
    fn test_stopping_superseded_session_keeps_replacement() {
        let (_engine, mut controller, track) = setup();
        let old = controller
            .start(&track, Mode::Preview, 0.0, ChainSettings::default())
            .unwrap();
        let new = controller
            .start(&track, Mode::Preview, 0.0, ChainSettings::default())
            .unwrap();
        assert!(!controller.stop(&old));
        assert_eq!(Some(new.id()), controller.live_session(track.id()));
    }

    #[test]
    fn test_loop_trigger_outside_bounds_starts_at_loop_start() {
        let (engine, mut controller, mut track) = setup();
        track.set_loop_bounds(2.0, 3.0);
        let session = controller
            .start(&track, Mode::Loop, 0.5, ChainSettings::default())
            .unwrap();
        assert_eq!(2.0, session.trigger_point());

        let session = controller
            .start(&track, Mode::Loop, 3.5, ChainSettings::default())
            .unwrap();
        assert_eq!(2.0, session.trigger_point());
        engine.advance(0.25);
        let (position, ended) = session.position_at(engine.current_time());
        assert!((position - 2.25).abs() < 1e-3, "position {}", position);
        assert!(!ended);

        let session = controller
            .start(&track, Mode::Loop, 2.5, ChainSettings::default())
            .unwrap();
        assert_eq!(2.5, session.trigger_point());
    }

    #[test]
    fn test_trigger_past_end_restarts_from_zero() {
        let (_engine, mut controller, track) = setup();
        let session = controller
            .start(&track, Mode::Preview, 10.0, ChainSettings::default())
            .unwrap();
        assert_eq!(0.0, session.trigger_point());
    }
}
