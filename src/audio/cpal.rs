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
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{graph::Chain, mixer::AudioMixer, thread_priority, EngineState};
use crate::{config, error::WorkstationError};

/// Commands handled by the output thread, which owns the stream.
enum Control {
    Play(Sender<Result<(), String>>),
    Pause(Sender<Result<(), String>>),
    Close,
}

/// An output device as reported by cpal.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// An engine that plays through a cpal output stream.
pub struct Engine {
    name: String,
    sample_rate: u32,
    channels: u16,
    state: Mutex<EngineState>,
    clock: Arc<AtomicU64>,
    chain_tx: Sender<Chain>,
    control_tx: Sender<Control>,
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Builds the render callback for a stream of sample type T. The callback owns
/// the mixer and picks up newly connected chains at the start of every block.
fn render_callback<T>(
    mut mixer: AudioMixer,
    chain_rx: Receiver<Chain>,
    block_frames: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = mixer.num_channels() as usize;
    let mut scratch = vec![0.0f32; block_frames * channels];
    let priority = thread_priority::callback_priority();
    let mut promoted = false;

    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        thread_priority::promote_callback_thread(priority, &mut promoted);

        while let Ok(chain) = chain_rx.try_recv() {
            mixer.add_chain(chain);
        }

        if scratch.len() < data.len() {
            scratch.resize(data.len(), 0.0);
        }
        let scratch = &mut scratch[..data.len()];
        mixer.process_into_output(scratch, data.len() / channels);

        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: AudioMixer,
    chain_rx: Receiver<Chain>,
    block_frames: usize,
) -> Result<cpal::Stream, String> {
    let on_error = |err: cpal::StreamError| error!(err = %err, "cpal output stream error");

    let result = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            stream_config,
            render_callback::<f32>(mixer, chain_rx, block_frames),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            stream_config,
            render_callback::<i16>(mixer, chain_rx, block_frames),
            on_error,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_output_stream(
            stream_config,
            render_callback::<i32>(mixer, chain_rx, block_frames),
            on_error,
            None,
        ),
        other => return Err(format!("unsupported sample format {}", other)),
    };
    result.map_err(|e| e.to_string())
}

fn device_error<E: fmt::Display>(e: E) -> WorkstationError {
    WorkstationError::Device(e.to_string())
}

impl Engine {
    /// Lists output devices across every available host.
    pub fn list() -> Result<Vec<DeviceInfo>, WorkstationError> {
        let mut devices = Vec::new();
        for (host_id, device) in Engine::all_devices()? {
            let max_channels = match device.supported_output_configs() {
                Ok(configs) => configs.map(|config| config.channels()).max().unwrap_or(0),
                Err(_) => continue,
            };
            if max_channels == 0 {
                continue;
            }
            devices.push(DeviceInfo {
                name: device.name().map_err(device_error)?,
                host: host_id.name().to_string(),
                max_channels,
            });
        }
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    fn all_devices() -> Result<Vec<(cpal::HostId, cpal::Device)>, WorkstationError> {
        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id).map_err(device_error)?;
            match host.output_devices() {
                Ok(host_devices) => devices.extend(host_devices.map(|device| (host_id, device))),
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                }
            }
        }
        Ok(devices)
    }

    fn find_device(name: &str) -> Result<cpal::Device, WorkstationError> {
        if name == "default" {
            return cpal::default_host()
                .default_output_device()
                .ok_or_else(|| WorkstationError::Device("no default output device".to_string()));
        }

        Engine::all_devices()?
            .into_iter()
            .map(|(_, device)| device)
            .find(|device| {
                device
                    .name()
                    .map(|device_name| device_name.trim() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| WorkstationError::Device(format!("no device found with name {}", name)))
    }

    /// Opens the configured device. The stream is built suspended.
    pub fn get(config: &config::Audio) -> Result<Engine, WorkstationError> {
        let device = Engine::find_device(config.device())?;
        let name = device.name().map_err(device_error)?;
        let default_config = device.default_output_config().map_err(device_error)?;
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();

        let requested: cpal::SampleRate = config.sample_rate();
        let supports_requested = device
            .supported_output_configs()
            .map(|mut configs| {
                configs.any(|range| {
                    range.channels() == channels
                        && range.sample_format() == sample_format
                        && range.min_sample_rate() <= requested
                        && requested <= range.max_sample_rate()
                })
            })
            .unwrap_or(false);
        let sample_rate = if supports_requested {
            requested
        } else {
            default_config.sample_rate()
        };

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let mixer = AudioMixer::new(channels, sample_rate);
        let clock = mixer.clock();
        let (chain_tx, chain_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<Control>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let block_frames = config.buffer_size();

        let thread_name = name.clone();
        let output_thread = thread::spawn(move || {
            let span = span!(Level::INFO, "cpal output", device = thread_name);
            let _enter = span.enter();

            let stream = match build_stream(
                &device,
                &stream_config,
                sample_format,
                mixer,
                chain_rx,
                block_frames,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // Some hosts start streams on creation.
            if let Err(e) = stream.pause() {
                debug!(err = %e, "Unable to pause new stream");
            }
            let _ = ready_tx.send(Ok(()));

            for control in control_rx.iter() {
                match control {
                    Control::Play(reply) => {
                        let _ = reply.send(stream.play().map_err(|e| e.to_string()));
                    }
                    Control::Pause(reply) => {
                        let _ = reply.send(stream.pause().map_err(|e| e.to_string()));
                    }
                    Control::Close => break,
                }
            }
            info!("Output stream closed");
        });

        ready_rx
            .recv()
            .map_err(device_error)?
            .map_err(WorkstationError::Device)?;

        info!(
            device = name,
            channels,
            sample_rate = sample_rate,
            format = %sample_format,
            "Output stream ready"
        );

        Ok(Engine {
            name,
            sample_rate: sample_rate,
            channels,
            state: Mutex::new(EngineState::Suspended),
            clock,
            chain_tx,
            control_tx,
            output_thread: Mutex::new(Some(output_thread)),
        })
    }

    fn command(
        &self,
        control: fn(Sender<Result<(), String>>) -> Control,
    ) -> Result<(), WorkstationError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.control_tx
            .send(control(reply_tx))
            .map_err(|_| WorkstationError::Device(format!("{} output thread is gone", self.name)))?;
        reply_rx
            .recv()
            .map_err(device_error)?
            .map_err(WorkstationError::Device)
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
            EngineState::Running => Ok(()),
            EngineState::Suspended => {
                self.command(Control::Play)?;
                *state = EngineState::Running;
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<(), WorkstationError> {
        let mut state = self.state.lock();
        if *state == EngineState::Running {
            self.command(Control::Pause)?;
            *state = EngineState::Suspended;
        }
        Ok(())
    }

    fn close(&self) {
        *self.state.lock() = EngineState::Closed;
        let _ = self.control_tx.send(Control::Close);
        if let Some(thread) = self.output_thread.lock().take() {
            let _ = thread.join();
        }
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
        self.chain_tx
            .send(chain)
            .map_err(|_| WorkstationError::Device(format!("{} output thread is gone", self.name)))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Engine>, WorkstationError> {
        Err(WorkstationError::Device("not a mock".to_string()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        super::Engine::close(self);
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, {} Hz)",
            self.name, self.channels, self.sample_rate
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            name: "Speakers".to_string(),
            host: "ALSA".to_string(),
            max_channels: 2,
        };
        assert_eq!("Speakers (Channels=2) (ALSA)", info.to_string());
    }
}
