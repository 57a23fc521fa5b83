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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing_subscriber::EnvFilter;

use sampledeck::audio::{self, decode, Engine, Lifecycle};
use sampledeck::config::{Audio, WorkstationConfig};
use sampledeck::controller::{keyboard, Controller};
use sampledeck::regions::LogSurface;
use sampledeck::tempo::TimeSignature;
use sampledeck::track::Mode;
use sampledeck::util;
use sampledeck::waveform;
use sampledeck::workstation::{Options, Workstation};

/// Characters for the peak overview, quietest first.
const PEAK_GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample deck with loop, cue and preview playback."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Decodes a sample and prints what it contains.
    Info {
        /// The path to the sample.
        path: PathBuf,
        /// The width of the peak overview in characters.
        #[arg(short, long, default_value_t = 64)]
        width: usize,
    },
    /// Plays a sample. Without --for, reads commands from the keyboard.
    Play {
        /// The path to the sample.
        path: PathBuf,
        /// The path to the workstation config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config.
        #[arg(short, long)]
        device: Option<String>,
        /// The playback mode.
        #[arg(short, long, default_value_t = Mode::Preview)]
        mode: Mode,
        /// The loop start in seconds.
        #[arg(long)]
        loop_start: Option<f64>,
        /// The loop end in seconds.
        #[arg(long)]
        loop_end: Option<f64>,
        /// Cue points in seconds. May be given more than once.
        #[arg(long = "cue")]
        cues: Vec<f64>,
        /// The tempo of the sample.
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// The time signature of the sample.
        #[arg(long, default_value_t = TimeSignature::default())]
        time_signature: TimeSignature,
        /// The playback speed ratio.
        #[arg(short, long)]
        speed: Option<f64>,
        /// Plays for this long, then exits, e.g. 10s.
        #[arg(long = "for")]
        play_for: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Info { path, width } => {
            let buffer = decode::decode_file(&path)?;
            println!("{}:", util::filename_display(&path));
            println!(
                "- Duration: {}",
                util::duration_minutes_seconds(buffer.duration_time())
            );
            println!("- Sample rate: {}", buffer.sample_rate());
            println!("- Channels: {}", buffer.channel_count());
            println!("- Frames: {}", buffer.frames());

            let overview: String = waveform::peaks(&buffer, width.max(1))
                .iter()
                .map(|peak| {
                    let level = (peak.max - peak.min).clamp(0.0, 2.0) / 2.0;
                    PEAK_GLYPHS[(level * (PEAK_GLYPHS.len() - 1) as f32).round() as usize]
                })
                .collect();
            println!("[{}]", overview);
        }
        Commands::Play {
            path,
            config,
            device,
            mode,
            loop_start,
            loop_end,
            cues,
            bpm,
            time_signature,
            speed,
            play_for,
        } => {
            let mut config = WorkstationConfig::load(config.as_deref())?;
            if let Some(device) = device {
                config = config.with_audio(Audio::new(&device));
            }
            let play_for = match play_for {
                Some(play_for) => Some(Duration::from(DurationString::from_string(play_for)?)),
                None => None,
            };

            let engine = audio::get_engine(config.audio())?;
            let lifecycle = Lifecycle::new(engine.clone());
            let options = Options::from_config(&config)?;
            let mut workstation = Workstation::new(engine.clone(), LogSurface, options);

            let track = workstation.load_file(&path, bpm, time_signature)?;
            workstation.set_mode(track, mode)?;
            if loop_start.is_some() || loop_end.is_some() {
                let (start, end) = workstation
                    .track(track)
                    .map(|track| track.loop_bounds())
                    .unwrap_or_default();
                workstation.set_loop_bounds(
                    track,
                    loop_start.unwrap_or(start),
                    loop_end.unwrap_or(end),
                )?;
            }
            for (index, cue) in cues.into_iter().enumerate() {
                workstation.set_cue_point(track, index, cue)?;
            }
            if let Some(speed) = speed {
                workstation.set_speed(track, speed)?;
            }
            if mode == Mode::Cue {
                workstation.select_cue_track(Some(track))?;
            }

            // Running the command is the gesture that unlocks output.
            lifecycle.gate().open();
            lifecycle.ensure_ready().await?;
            workstation.play(track, None)?;
            println!(
                "Playing {} on {} at {} BPM.",
                util::filename_display(&path),
                engine,
                workstation.effective_tempo(track)?
            );

            match play_for {
                Some(play_for) => {
                    let deadline = Instant::now() + play_for;
                    while Instant::now() < deadline && workstation.is_playing(track) {
                        workstation.wait_frame(Duration::from_millis(100));
                    }
                    let position = workstation.current_position(track)?;
                    workstation.stop_all();
                    println!("Stopped at {}.", util::position_display(position));
                }
                None => {
                    let driver = Arc::new(keyboard::Driver::new());
                    let controller = Controller::new(workstation, lifecycle, track, driver);
                    controller.join().await?;
                }
            }
            engine.close();
        }
    }

    Ok(())
}
