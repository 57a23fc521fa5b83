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

//! Immutable decoded audio shared between the control side and the render path.

use std::sync::Arc;
use std::time::Duration;

use super::decode::DecodeError;

struct BufferData {
    /// Planar samples, one Vec per channel, all the same length.
    planes: Vec<Vec<f32>>,
    sample_rate: u32,
}

/// A fully decoded audio asset. Cloning is cheap; the samples are shared.
#[derive(Clone)]
pub struct DecodedBuffer {
    data: Arc<BufferData>,
}

impl DecodedBuffer {
    /// Creates a buffer from planar channel data. Channels of unequal length are
    /// truncated to the shortest.
    pub fn from_planar(mut planes: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, DecodeError> {
        if planes.is_empty() || sample_rate == 0 {
            return Err(DecodeError::Empty);
        }
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        if frames == 0 {
            return Err(DecodeError::Empty);
        }
        for plane in planes.iter_mut() {
            plane.truncate(frames);
        }
        Ok(DecodedBuffer {
            data: Arc::new(BufferData {
                planes,
                sample_rate,
            }),
        })
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: u16,
        sample_rate: u32,
    ) -> Result<Self, DecodeError> {
        let channels = channel_count as usize;
        if channels == 0 {
            return Err(DecodeError::Empty);
        }
        let frames = samples.len() / channels;
        let mut planes = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (plane, sample) in planes.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }
        DecodedBuffer::from_planar(planes, sample_rate)
    }

    /// Returns the sample rate of the decoded audio.
    pub fn sample_rate(&self) -> u32 {
        self.data.sample_rate
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.data.planes.len() as u16
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.planes[0].len()
    }

    /// Returns the duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate() as f64
    }

    /// Returns the duration as a std Duration.
    pub fn duration_time(&self) -> Duration {
        Duration::from_secs_f64(self.duration())
    }

    /// Returns the samples of a single channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data.planes[index]
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.planes.iter().map(Vec::len).sum::<usize>() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channel_count())
            .field("frames", &self.frames())
            .finish()
    }
}
