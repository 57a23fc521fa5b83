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

use crate::config;
use crate::error::WorkstationError;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod engine;
pub mod filter;
pub mod graph;
pub mod mixer;
pub mod mock;
mod thread_priority;

pub use buffer::DecodedBuffer;
pub use decode::DecodeError;
pub use engine::{GestureGate, Lifecycle};
pub use graph::{Chain, ChainParams, ChainSettings, FilterSettings, Node, Playback};

/// Whether an engine is currently able to produce sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created but not yet allowed to play, or paused by the platform.
    Suspended,
    Running,
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            EngineState::Suspended => "suspended",
            EngineState::Running => "running",
            EngineState::Closed => "closed",
        };
        write!(f, "{}", state)
    }
}

/// An audio engine renders connected chains to an output and owns the clock
/// that playback positions are derived from.
pub trait Engine: fmt::Display + Send + Sync {
    fn state(&self) -> EngineState;

    /// Starts or restarts output.
    fn resume(&self) -> Result<(), WorkstationError>;

    /// Pauses output. The clock stops with it.
    fn suspend(&self) -> Result<(), WorkstationError>;

    /// Shuts the engine down for good.
    fn close(&self);

    /// Seconds of audio rendered so far.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Hands a chain to the render path. Fails unless the engine is running.
    fn connect(&self, chain: Chain) -> Result<(), WorkstationError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Engine>, WorkstationError>;
}

pub type EngineHandle = Arc<dyn Engine>;

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, WorkstationError> {
    cpal::Engine::list()
}

/// Gets the engine named by the configuration.
pub fn get_engine(config: &config::Audio) -> Result<EngineHandle, WorkstationError> {
    if config.is_mock() {
        return Ok(Arc::new(mock::Engine::get(config)));
    }

    Ok(Arc::new(cpal::Engine::get(config)?))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mock_engine_from_config() {
        let engine = get_engine(&config::Audio::new("mock-output")).unwrap();
        assert_eq!("mock-output (Mock)", engine.to_string());
        assert_eq!(EngineState::Suspended, engine.state());
        assert_eq!(2, engine.channels());

        // The mock shares state with the handle it came from.
        let mock = engine.to_mock().unwrap();
        engine.resume().unwrap();
        assert_eq!(EngineState::Running, mock.state());
        mock.advance(0.5);
        assert!((engine.current_time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!("suspended", EngineState::Suspended.to_string());
        assert_eq!("running", EngineState::Running.to_string());
        assert_eq!("closed", EngineState::Closed.to_string());
    }
}
