// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{graph::Chain, mixer::AudioMixer, EngineState};
use crate::{config, error::WorkstationError};

/// A mock engine. Renders through a real mixer, but only when told to, so the
/// clock is entirely under the caller's control.
#[derive(Clone)]
pub struct Engine {
    name: String,
    sample_rate: u32,
    channels: u16,
    block_frames: usize,
    state: Arc<Mutex<EngineState>>,
    mixer: Arc<Mutex<AudioMixer>>,
    clock: Arc<AtomicU64>,
    /// Rounding left over from previous advances, in frames.
    remainder: Arc<Mutex<f64>>,
}

impl Engine {
    /// Creates a suspended mock engine.
    pub fn new(name: &str, sample_rate: u32, channels: u16, block_frames: usize) -> Engine {
        let mixer = AudioMixer::new(channels.max(1), sample_rate.max(1));
        let clock = mixer.clock();
        Engine {
            name: name.to_string(),
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            block_frames: block_frames.max(1),
            state: Arc::new(Mutex::new(EngineState::Suspended)),
            mixer: Arc::new(Mutex::new(mixer)),
            clock,
            remainder: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Gets a mock engine for the given configuration.
    pub fn get(config: &config::Audio) -> Engine {
        Engine::new(
            config.device(),
            config.sample_rate(),
            2,
            config.buffer_size(),
        )
    }

    /// Advances the clock by the given number of seconds, rendering as it goes.
    /// Does nothing unless the engine is running.
    pub fn advance(&self, seconds: f64) {
        if seconds <= 0.0 || !seconds.is_finite() {
            return;
        }
        let frames = {
            let mut remainder = self.remainder.lock();
            let exact = seconds * self.sample_rate as f64 + *remainder;
            let frames = exact.round();
            *remainder = exact - frames;
            frames.max(0.0) as usize
        };
        self.render(frames);
    }

    /// Renders the given number of frames and returns them interleaved. Returns
    /// nothing unless the engine is running.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        if *self.state.lock() != EngineState::Running {
            return Vec::new();
        }

        let channels = self.channels as usize;
        let mut output = vec![0.0; frames * channels];
        let mut mixer = self.mixer.lock();
        for block in output.chunks_mut(self.block_frames * channels) {
            let block_frames = block.len() / channels;
            mixer.process_into_output(block, block_frames);
        }
        output
    }

    /// Number of chains still held by the mixer.
    pub fn active_chains(&self) -> usize {
        self.mixer.lock().active_chains()
    }
}

impl super::Engine for Engine {
    fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<(), WorkstationError> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Closed => Err(WorkstationError::Device(format!(
                "{} has been closed",
                self.name
            ))),
            _ => {
                *state = EngineState::Running;
                info!(device = self.name, "Mock engine running");
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<(), WorkstationError> {
        let mut state = self.state.lock();
        if *state == EngineState::Running {
            *state = EngineState::Suspended;
            debug!(device = self.name, "Mock engine suspended");
        }
        Ok(())
    }

    fn close(&self) {
        *self.state.lock() = EngineState::Closed;
    }

    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn connect(&self, chain: Chain) -> Result<(), WorkstationError> {
        if *self.state.lock() != EngineState::Running {
            return Err(WorkstationError::EngineNotReady);
        }
        self.mixer.lock().add_chain(chain);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Engine>, WorkstationError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
