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
use std::{
    error::Error,
    f32::consts::PI,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::DecodedBuffer;

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// A sine wave at 0.8 amplitude.
pub fn sine_wave(frequency: f32, sample_rate: u32, duration_seconds: f32) -> Vec<f32> {
    let count = (sample_rate as f32 * duration_seconds) as usize;
    (0..count)
        .map(|i| 0.8 * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Calculate RMS (Root Mean Square) of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// A silent mono buffer of the given length.
pub fn silent_buffer(duration_seconds: f64, sample_rate: u32) -> DecodedBuffer {
    let frames = ((duration_seconds * sample_rate as f64).round() as usize).max(1);
    DecodedBuffer::from_planar(vec![vec![0.0; frames]], sample_rate).unwrap()
}

/// A mono buffer whose sample i is i / frames.
pub fn ramp_buffer(frames: usize, sample_rate: u32) -> DecodedBuffer {
    let plane = (0..frames).map(|i| i as f32 / frames as f32).collect();
    DecodedBuffer::from_planar(vec![plane], sample_rate).unwrap()
}

/// A mono buffer holding one value.
pub fn constant_buffer(value: f32, frames: usize, sample_rate: u32) -> DecodedBuffer {
    DecodedBuffer::from_planar(vec![vec![value; frames]], sample_rate).unwrap()
}

/// Writes planar float samples to a 16 bit WAV file.
pub fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    for frame in 0..frames {
        for channel in channels {
            let sample = (channel[frame].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}
