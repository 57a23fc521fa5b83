// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

// Block mixing shared by the cpal callback and the mock engine.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::graph::Chain;

/// Mixes connected chains into interleaved output blocks and counts the frames it has
/// rendered. That count is the engine clock.
pub struct AudioMixer {
    /// Chains currently sounding.
    chains: Vec<Chain>,
    /// Number of output channels.
    num_channels: u16,
    /// Output sample rate.
    sample_rate: u32,
    /// Total frames rendered since the mixer was created.
    frames_rendered: Arc<AtomicU64>,
}

impl AudioMixer {
    /// Creates a new audio mixer.
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            chains: Vec::with_capacity(8),
            num_channels,
            sample_rate,
            frames_rendered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Adds a chain. It is heard from the next block on.
    pub fn add_chain(&mut self, chain: Chain) {
        self.chains.push(chain);
    }

    /// Number of chains still held by the mixer.
    pub fn active_chains(&self) -> usize {
        self.chains.len()
    }

    /// The shared frame counter.
    pub fn clock(&self) -> Arc<AtomicU64> {
        self.frames_rendered.clone()
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Renders `num_frames` frames into `output`, which must hold at least
    /// `num_frames * num_channels` samples.
    pub fn process_into_output(&mut self, output: &mut [f32], num_frames: usize) {
        let channels = self.num_channels as usize;
        let len = (num_frames * channels).min(output.len());
        let output = &mut output[..len];
        output.fill(0.0);

        // Stopped chains go before anything is rendered so a replacement never
        // overlaps the chain it replaced.
        self.chains.retain(|chain| !chain.params().is_cancelled());
        for chain in self.chains.iter_mut() {
            chain.render_add(output, num_frames, channels);
        }
        self.chains.retain(|chain| !chain.is_done());

        self.frames_rendered
            .fetch_add(num_frames as u64, Ordering::Release);
    }
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("chains", &self.chains.len())
            .field("num_channels", &self.num_channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames_rendered", &self.frames_rendered.load(Ordering::Relaxed))
            .finish()
    }
}
