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

//! Playback position math and the throttled position feed.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use super::{PlaybackSession, SessionId};
use crate::audio::EngineHandle;
use crate::track::TrackId;

/// Position inside a loop after `elapsed` seconds at `speed`, starting from
/// `anchor` (a buffer position).
///
/// With the anchor at the loop start this is
/// `loop_start + (elapsed * speed) mod (loop_end - loop_start)`.
pub fn loop_position(loop_start: f64, loop_end: f64, anchor: f64, elapsed: f64, speed: f64) -> f64 {
    let length = loop_end - loop_start;
    if length <= 0.0 || !length.is_finite() {
        return loop_start;
    }
    let travelled = (anchor - loop_start) + elapsed.max(0.0) * speed;
    loop_start + travelled.rem_euclid(length)
}

/// Position of a one-shot after `elapsed` seconds at `speed` from `anchor`.
/// Returns the position and whether the end of the buffer was reached. Once
/// ended the position reads 0.
pub fn one_shot_position(anchor: f64, elapsed: f64, speed: f64, duration: f64) -> (f64, bool) {
    let position = anchor + elapsed.max(0.0) * speed;
    if position >= duration {
        (0.0, true)
    } else {
        (position, false)
    }
}

/// The result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub session: SessionId,
    pub track: TrackId,
    pub position: f64,
    /// True if this tick's position went out to listeners.
    pub published: bool,
    /// True once a one-shot has reached the end of its buffer.
    pub ended: bool,
}

type PositionListener = Box<dyn FnMut(TrackId, f64) + Send>;

/// Derives playback positions from the engine clock and publishes them at a
/// bounded rate.
pub struct PlaybackScheduler {
    engine: EngineHandle,
    publish_interval: f64,
    last_published: Option<f64>,
    last_position: f64,
    listeners: Vec<PositionListener>,
}

impl PlaybackScheduler {
    pub fn new(engine: EngineHandle, publish_interval: Duration) -> PlaybackScheduler {
        PlaybackScheduler {
            engine,
            publish_interval: publish_interval.as_secs_f64(),
            last_published: None,
            last_position: 0.0,
            listeners: Vec::new(),
        }
    }

    /// The session's position right now, by the engine clock.
    pub fn current_position(&self, session: &PlaybackSession) -> f64 {
        session.position_at(self.engine.current_time()).0
    }

    /// The last position that was published.
    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    /// Registers a callback for published positions.
    pub fn on_position_change<F>(&mut self, listener: F)
    where
        F: FnMut(TrackId, f64) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Recomputes the position. Publishes it if the publish interval has passed
    /// on the engine clock, or if playback just ended.
    pub fn tick(&mut self, session: &PlaybackSession) -> PositionUpdate {
        let now = self.engine.current_time();
        let (position, ended) = session.position_at(now);

        let due = match self.last_published {
            None => true,
            Some(last) => now - last >= self.publish_interval,
        };
        let published = due || ended;
        if published {
            self.publish(session.track_id(), position, now);
        }

        PositionUpdate {
            session: session.id(),
            track: session.track_id(),
            position,
            published,
            ended,
        }
    }

    /// Publishes a position outside of the tick cadence, e.g. after a seek or stop.
    pub fn publish_now(&mut self, track: TrackId, position: f64) {
        let now = self.engine.current_time();
        self.publish(track, position, now);
    }

    fn publish(&mut self, track: TrackId, position: f64, now: f64) {
        self.last_published = Some(now);
        self.last_position = position;
        for listener in self.listeners.iter_mut() {
            listener(track, position);
        }
    }

    /// Forgets the publish cadence so the next tick publishes immediately.
    pub fn reset(&mut self) {
        debug!("Position feed reset");
        self.last_published = None;
    }
}

impl fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("publish_interval", &self.publish_interval)
            .field("last_published", &self.last_published)
            .field("last_position", &self.last_position)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
