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

//! The decoded-audio provider: turns a raw file into a [DecodedBuffer].
//!
//! Uses symphonia so WAV, FLAC, MP3, OGG and friends are all handled the same way.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::buffer::DecodedBuffer;

/// Error types for audio decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported or corrupt audio: {0}")]
    Unsupported(String),

    #[error("No audio track found")]
    NoTrack,

    #[error("Audio contains no samples")]
    Empty,

    #[error("Audio file error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes an audio file from disk.
pub fn decode_file(path: &Path) -> Result<DecodedBuffer, DecodeError> {
    let file = File::open(path).map_err(|e| {
        DecodeError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let buffer = decode_source(Box::new(file), hint)?;
    info!(
        path = ?path,
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        duration_ms = buffer.duration_time().as_millis(),
        memory_kb = buffer.memory_size() / 1024,
        "Decoded audio file"
    );
    Ok(buffer)
}

/// Decodes an in-memory audio file. The extension, if given, helps format detection.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedBuffer, DecodeError> {
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }
    decode_source(Box::new(Cursor::new(bytes)), hint)
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported("sample rate not specified".to_string()))?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            // Some readers report a decode error at the end of the stream.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let capacity = decoded.capacity();
        let needed = capacity * spec.channels.count();
        if sample_buffer
            .as_ref()
            .map_or(true, |buf| buf.capacity() < needed)
        {
            sample_buffer = Some(SampleBuffer::new(capacity as u64, spec));
        }
        if let Some(buf) = sample_buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 || interleaved.is_empty() {
        return Err(DecodeError::Empty);
    }

    DecodedBuffer::from_interleaved(&interleaved, channels as u16, sample_rate)
}
