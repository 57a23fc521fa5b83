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
use std::sync::Arc;

use crate::audio::{ChainParams, Node};
use crate::track::{Mode, TrackId};

pub mod controller;
pub mod frames;
pub mod scheduler;

pub use controller::AudioGraphController;
pub use frames::FrameLoop;
pub use scheduler::{PlaybackScheduler, PositionUpdate};

/// Identifies one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> SessionId {
        SessionId(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The control-side view of one live signal chain.
///
/// Positions are derived from an anchor: the buffer position at a given engine
/// time. Speed and loop changes move the anchor to the current position so
/// the derived position never jumps.
pub struct PlaybackSession {
    id: SessionId,
    track_id: TrackId,
    mode: Mode,
    trigger_point: f64,
    duration: f64,
    anchor_position: f64,
    anchor_time: f64,
    speed_ratio: f64,
    loop_bounds: (f64, f64),
    params: Arc<ChainParams>,
}

impl PlaybackSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SessionId,
        track_id: TrackId,
        mode: Mode,
        trigger_point: f64,
        duration: f64,
        started_at: f64,
        speed_ratio: f64,
        loop_bounds: (f64, f64),
        params: Arc<ChainParams>,
    ) -> PlaybackSession {
        PlaybackSession {
            id,
            track_id,
            mode,
            trigger_point,
            duration,
            anchor_position: trigger_point,
            anchor_time: started_at,
            speed_ratio,
            loop_bounds,
            params,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Where in the buffer this session began.
    pub fn trigger_point(&self) -> f64 {
        self.trigger_point
    }

    pub fn speed_ratio(&self) -> f64 {
        self.speed_ratio
    }

    pub fn loop_bounds(&self) -> (f64, f64) {
        self.loop_bounds
    }

    pub fn params(&self) -> &Arc<ChainParams> {
        &self.params
    }

    /// The live chain's nodes in signal order.
    pub fn topology(&self) -> Vec<Node> {
        self.params.topology()
    }

    pub fn is_stopped(&self) -> bool {
        self.params.is_cancelled()
    }

    /// The position at engine time `now`, and whether a one-shot has ended.
    pub fn position_at(&self, now: f64) -> (f64, bool) {
        let elapsed = now - self.anchor_time;
        match self.mode {
            Mode::Loop => {
                let (start, end) = self.loop_bounds;
                (
                    scheduler::loop_position(
                        start,
                        end,
                        self.anchor_position,
                        elapsed,
                        self.speed_ratio,
                    ),
                    false,
                )
            }
            Mode::Preview | Mode::Cue => {
                let (position, ended) = scheduler::one_shot_position(
                    self.anchor_position,
                    elapsed,
                    self.speed_ratio,
                    self.duration,
                );
                (position, ended || self.params.is_finished())
            }
        }
    }

    fn reanchor(&mut self, now: f64) {
        let (position, _) = self.position_at(now);
        self.anchor_position = position;
        self.anchor_time = now;
    }

    pub(crate) fn change_speed(&mut self, speed_ratio: f64, now: f64) {
        self.reanchor(now);
        self.speed_ratio = speed_ratio;
    }

    pub(crate) fn change_loop_bounds(&mut self, bounds: (f64, f64), now: f64) {
        self.reanchor(now);
        self.loop_bounds = bounds;
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("track_id", &self.track_id)
            .field("mode", &self.mode)
            .field("trigger_point", &self.trigger_point)
            .field("speed_ratio", &self.speed_ratio)
            .field("loop_bounds", &self.loop_bounds)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ChainSettings;

    fn session(mode: Mode, trigger: f64) -> PlaybackSession {
        PlaybackSession::new(
            SessionId::new(1),
            TrackId::new(1),
            mode,
            trigger,
            10.0,
            100.0,
            1.0,
            (2.0, 8.0),
            Arc::new(ChainParams::new(ChainSettings::default(), 2.0, 8.0)),
        )
    }

    #[test]
    fn test_speed_change_keeps_position_continuous() {
        let mut session = session(Mode::Preview, 1.0);
        assert_eq!((3.0, false), session.position_at(102.0));

        session.change_speed(2.0, 102.0);
        assert_eq!((3.0, false), session.position_at(102.0));
        assert_eq!((5.0, false), session.position_at(103.0));
        assert_eq!(2.0, session.speed_ratio());
    }

    #[test]
    fn test_loop_change_reanchors() {
        let mut session = session(Mode::Loop, 2.0);
        let (position, ended) = session.position_at(107.5);
        assert!((position - 3.5).abs() < 1e-9);
        assert!(!ended);

        session.change_loop_bounds((3.0, 4.0), 107.5);
        let (position, _) = session.position_at(108.0);
        assert!((position - 3.0).abs() < 1e-9);
        assert_eq!((3.0, 4.0), session.loop_bounds());
    }

    #[test]
    fn test_finished_chain_ends_one_shot() {
        let session = session(Mode::Cue, 1.0);
        assert_eq!((0.0, true), session.position_at(200.0));
        assert!(!session.is_stopped());
        assert_eq!(1.0, session.trigger_point());
    }
}
