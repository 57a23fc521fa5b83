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

//! The render-side signal chain for a single playback session.
//!
//! A chain is `source -> [highpass -> lowpass] -> gain -> output`. The control
//! side keeps an `Arc<ChainParams>` and writes into it; the render side reads
//! it once per block. Nothing here allocates or locks while rendering.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::DecodedBuffer;
use crate::audio::filter::FilterPair;
use crate::playsync::CancelHandle;

/// A node in a signal chain, in signal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Source,
    Highpass,
    Lowpass,
    Gain,
    Output,
}

/// Filter parameters for a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
    pub enabled: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            lowpass_hz: 20000.0,
            highpass_hz: 20.0,
            enabled: false,
        }
    }
}

/// Initial parameters for a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    pub gain: f32,
    pub speed_ratio: f64,
    pub filter: FilterSettings,
}

impl Default for ChainSettings {
    fn default() -> Self {
        ChainSettings {
            gain: 1.0,
            speed_ratio: 1.0,
            filter: FilterSettings::default(),
        }
    }
}

/// Live parameters shared between a session and its chain.
pub struct ChainParams {
    gain: AtomicU32,
    speed: AtomicU64,
    lowpass_hz: AtomicU32,
    highpass_hz: AtomicU32,
    filter_enabled: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    /// Bumped whenever the filter or loop settings change.
    generation: AtomicU64,
    finished: AtomicBool,
    cancel_handle: CancelHandle,
}

impl ChainParams {
    pub fn new(settings: ChainSettings, loop_start: f64, loop_end: f64) -> ChainParams {
        ChainParams {
            gain: AtomicU32::new(settings.gain.clamp(0.0, 1.0).to_bits()),
            speed: AtomicU64::new(settings.speed_ratio.to_bits()),
            lowpass_hz: AtomicU32::new(settings.filter.lowpass_hz.to_bits()),
            highpass_hz: AtomicU32::new(settings.filter.highpass_hz.to_bits()),
            filter_enabled: AtomicBool::new(settings.filter.enabled),
            loop_start: AtomicU64::new(loop_start.to_bits()),
            loop_end: AtomicU64::new(loop_end.to_bits()),
            generation: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            cancel_handle: CancelHandle::new(),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Sets the gain, clamped to [0, 1].
    pub fn set_gain(&self, gain: f32) {
        let gain = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed.load(Ordering::Relaxed))
    }

    pub fn set_speed(&self, speed: f64) {
        self.speed.store(speed.to_bits(), Ordering::Relaxed);
    }

    pub fn filter(&self) -> FilterSettings {
        FilterSettings {
            lowpass_hz: f32::from_bits(self.lowpass_hz.load(Ordering::Relaxed)),
            highpass_hz: f32::from_bits(self.highpass_hz.load(Ordering::Relaxed)),
            enabled: self.filter_enabled.load(Ordering::Relaxed),
        }
    }

    pub fn set_filter(&self, filter: FilterSettings) {
        self.lowpass_hz
            .store(filter.lowpass_hz.to_bits(), Ordering::Relaxed);
        self.highpass_hz
            .store(filter.highpass_hz.to_bits(), Ordering::Relaxed);
        self.filter_enabled.store(filter.enabled, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn loop_bounds(&self) -> (f64, f64) {
        (
            f64::from_bits(self.loop_start.load(Ordering::Relaxed)),
            f64::from_bits(self.loop_end.load(Ordering::Relaxed)),
        )
    }

    pub fn set_loop_bounds(&self, start: f64, end: f64) {
        self.loop_start.store(start.to_bits(), Ordering::Relaxed);
        self.loop_end.store(end.to_bits(), Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns true once a one-shot chain has played to the end of its buffer.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel_handle
    }

    /// Stops the chain. Returns false if it was already stopped.
    pub fn cancel(&self) -> bool {
        self.cancel_handle.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_handle.is_cancelled()
    }

    /// The nodes the chain currently runs through, in signal order.
    pub fn topology(&self) -> Vec<Node> {
        let mut nodes = vec![Node::Source];
        if self.filter_enabled.load(Ordering::Relaxed) {
            nodes.push(Node::Highpass);
            nodes.push(Node::Lowpass);
        }
        nodes.push(Node::Gain);
        nodes.push(Node::Output);
        nodes
    }
}

impl fmt::Debug for ChainParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainParams")
            .field("gain", &self.gain())
            .field("speed", &self.speed())
            .field("filter", &self.filter())
            .field("loop_bounds", &self.loop_bounds())
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// How a chain treats the end of its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// Wrap inside the loop bounds held by the params.
    Looping,
    /// Play once to the end of the buffer.
    OneShot,
}

/// A render-side chain. Owned by the mixer once connected.
pub struct Chain {
    id: u64,
    buffer: DecodedBuffer,
    params: Arc<ChainParams>,
    playback: Playback,
    /// Read position in buffer frames.
    position: f64,
    /// Buffer frames advanced per output frame at a speed of 1.
    rate_ratio: f64,
    filters: FilterPair,
    filter_enabled: bool,
    seen_generation: u64,
    loop_frames: (f64, f64),
}

impl Chain {
    /// Creates a chain that starts reading at `start_time` seconds.
    pub fn new(
        id: u64,
        buffer: DecodedBuffer,
        params: Arc<ChainParams>,
        playback: Playback,
        start_time: f64,
        output_rate: u32,
        output_channels: u16,
    ) -> Chain {
        let buffer_rate = buffer.sample_rate() as f64;
        let filter = params.filter();
        let filters = FilterPair::new(
            filter.highpass_hz,
            filter.lowpass_hz,
            output_rate,
            output_channels as usize,
        );
        let mut chain = Chain {
            id,
            params,
            playback,
            position: (start_time.max(0.0) * buffer_rate).min(buffer.frames() as f64),
            rate_ratio: buffer_rate / output_rate.max(1) as f64,
            filters,
            filter_enabled: filter.enabled,
            seen_generation: u64::MAX,
            loop_frames: (0.0, buffer.frames() as f64),
            buffer,
        };
        chain.refresh();
        chain
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &Arc<ChainParams> {
        &self.params
    }

    pub fn topology(&self) -> Vec<Node> {
        self.params.topology()
    }

    /// Current read position in seconds.
    pub fn position(&self) -> f64 {
        self.position / self.buffer.sample_rate() as f64
    }

    /// Returns true when the mixer should drop this chain.
    pub fn is_done(&self) -> bool {
        self.params.is_cancelled() || self.params.is_finished()
    }

    /// Picks up filter and loop changes published since the last block.
    fn refresh(&mut self) {
        let generation = self.params.generation();
        if generation == self.seen_generation {
            return;
        }
        self.seen_generation = generation;

        let filter = self.params.filter();
        self.filters
            .set_cutoffs(filter.highpass_hz, filter.lowpass_hz);
        self.filter_enabled = filter.enabled;

        let rate = self.buffer.sample_rate() as f64;
        let frames = self.buffer.frames() as f64;
        let (start, end) = self.params.loop_bounds();
        let start = (start * rate).clamp(0.0, frames);
        let end = (end * rate).clamp(0.0, frames);
        self.loop_frames = if end > start { (start, end) } else { (0.0, frames) };
    }

    /// Mixes `frames` frames of this chain into an interleaved output buffer.
    pub fn render_add(&mut self, output: &mut [f32], frames: usize, output_channels: usize) {
        if self.is_done() || output_channels == 0 {
            return;
        }
        self.refresh();

        let gain = self.params.gain();
        let step = self.params.speed().max(0.0) * self.rate_ratio;
        let total = self.buffer.frames();
        let source_channels = self.buffer.channel_count() as usize;
        let (loop_start, loop_end) = self.loop_frames;

        for frame in output.chunks_exact_mut(output_channels).take(frames) {
            if self.playback == Playback::Looping
                && (self.position >= loop_end || self.position < loop_start)
            {
                let length = loop_end - loop_start;
                self.position = loop_start + (self.position - loop_start).rem_euclid(length);
            }
            if self.position >= total as f64 {
                self.params.mark_finished();
                return;
            }

            let index = self.position as usize;
            let fraction = (self.position - index as f64) as f32;
            for (channel, sample) in frame.iter_mut().enumerate() {
                let plane = self.buffer.channel(channel.min(source_channels - 1));
                let current = plane[index];
                let next = plane.get(index + 1).copied().unwrap_or(current);
                let mut value = current + (next - current) * fraction;
                if self.filter_enabled {
                    value = self.filters.process(channel, value);
                }
                *sample += value * gain;
            }

            self.position += step;
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("playback", &self.playback)
            .field("position", &self.position())
            .field("topology", &self.topology())
            .finish()
    }
}
