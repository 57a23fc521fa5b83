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
use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::audio::Lifecycle;
use crate::error::WorkstationError;
use crate::regions::WaveformSurface;
use crate::track::{Mode, TrackId};
use crate::workstation::Workstation;

pub mod keyboard;

/// Controller events that will trigger behavior in the workstation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Plays the track from its default trigger point.
    Play,

    /// Stops the track. If nothing is playing, does nothing.
    Stop,

    /// Switches the track's playback mode.
    Mode(Mode),

    /// A digit key for the cue keyboard.
    Cue(char),

    /// A tap for tap tempo.
    Tap,

    /// Nudges the effective tempo up by about one BPM.
    Faster,

    /// Nudges the effective tempo down by about one BPM.
    Slower,

    /// Toggles the filter on the track.
    ToggleFilter,

    /// Logs the track's state.
    Status,

    /// Stops everything and closes the controller.
    Quit,
}

impl Event {
    /// True for events that count as a user gesture and need a running engine.
    fn needs_engine(&self) -> bool {
        matches!(self, Event::Play | Event::Cue(_))
    }
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives one track of a workstation from a driver's events.
pub struct Controller<S: WaveformSurface + Send + 'static> {
    handle: JoinHandle<Workstation<S>>,
}

impl<S: WaveformSurface + Send + 'static> Controller<S> {
    /// Creates a new controller with the given driver. The controller owns the
    /// workstation until it finishes.
    pub fn new(
        workstation: Workstation<S>,
        lifecycle: Lifecycle,
        track: TrackId,
        driver: Arc<dyn Driver>,
    ) -> Controller<S> {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(workstation, lifecycle, track, driver).instrument(span),
            ),
        }
    }

    /// Join will block until the controller finishes, handing back the workstation.
    pub async fn join(self) -> Result<Workstation<S>, JoinError> {
        self.handle.await
    }

    /// Triggers workstation events by watching the driver. While anything
    /// plays, the workstation's frame ticks pump it in between.
    async fn trigger_events(
        mut workstation: Workstation<S>,
        lifecycle: Lifecycle,
        track: TrackId,
        driver: Arc<dyn Driver>,
    ) -> Workstation<S> {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let started = Instant::now();

        info!(track = %track, "Controller started.");

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    info!(event = ?event, "Received event.");
                    if event == Event::Quit {
                        break;
                    }
                    if event.needs_engine() {
                        lifecycle.gate().open();
                        if let Err(e) = lifecycle.ensure_ready().await {
                            error!(err = %e, "Audio engine is unavailable");
                            continue;
                        }
                    }
                    if let Err(e) = Controller::handle(&mut workstation, track, event, started) {
                        error!("Error talking to workstation: {}", e);
                    }
                }
                _ = next_frame(workstation.frame_notifier()) => {
                    workstation.run_frame();
                }
            }
        }

        info!("Controller closing.");
        workstation.stop_all();
        // The driver may still be blocked on input; it ends with the process.
        if join_handle.is_finished() {
            if let Err(e) = join_handle.await {
                error!("Error waiting for event monitor to stop: {}", e);
            }
        }
        workstation
    }

    fn handle(
        workstation: &mut Workstation<S>,
        track: TrackId,
        event: Event,
        started: Instant,
    ) -> Result<(), WorkstationError> {
        match event {
            Event::Play => {
                workstation.play(track, None)?;
            }
            Event::Stop => {
                workstation.stop(track)?;
            }
            Event::Mode(mode) => {
                workstation.set_mode(track, mode)?;
                if mode == Mode::Cue {
                    workstation.select_cue_track(Some(track))?;
                }
            }
            Event::Cue(key) => {
                if workstation.key_pressed(key)?.is_none() {
                    info!(key = %key, "No cue for key");
                }
            }
            Event::Tap => {
                let at_ms = started.elapsed().as_secs_f64() * 1000.0;
                if let Some(bpm) = workstation.tap_tempo(track, at_ms)? {
                    info!(bpm, "Tempo tapped");
                }
            }
            Event::Faster | Event::Slower => {
                let step = workstation.speed_step(track)?;
                let step = if event == Event::Faster { step } else { -step };
                let ratio = workstation.settings(track)?.speed_ratio + step;
                let ratio = workstation.set_speed(track, ratio)?;
                info!(
                    speed = ratio,
                    bpm = workstation.effective_tempo(track)?,
                    "Speed changed"
                );
            }
            Event::ToggleFilter => {
                let enabled = !workstation.settings(track)?.filter.enabled;
                workstation.set_filter(track, None, None, Some(enabled), Instant::now())?;
            }
            Event::Status => {
                let settings = workstation.settings(track)?;
                if let Some(current) = workstation.track(track) {
                    info!(
                        mode = %current.mode(),
                        playing = workstation.is_playing(track),
                        position = workstation.current_position(track)?,
                        tempo = current.tempo(),
                        bpm = workstation.effective_tempo(track)?,
                        gain = settings.gain,
                        filter = settings.filter.enabled,
                        "Status"
                    );
                }
            }
            Event::Quit => {}
        }
        Ok(())
    }
}

/// Resolves on the next frame tick. Never resolves while idle.
async fn next_frame(notify: Option<Arc<Notify>>) {
    match notify {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}
