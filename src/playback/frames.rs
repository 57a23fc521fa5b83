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
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use tokio::sync::Notify;
use tracing::{debug, span, Level};

use crate::playsync::CancelHandle;

/// How long before a frame deadline the loop stops sleeping on the condvar
/// and spins instead.
const SPIN_MARGIN: Duration = Duration::from_millis(1);

/// A redraw-opportunity loop: a thread that ticks once per frame interval.
///
/// Ticks don't queue up. If the consumer misses one, the next tick replaces
/// it. Cancelling wakes the thread immediately and joins it. Async code waits
/// on [`FrameLoop::notifier`] instead of the channel.
pub struct FrameLoop {
    cancel_handle: CancelHandle,
    ticks: Receiver<Instant>,
    notify: Arc<Notify>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FrameLoop {
    pub fn start(interval: Duration) -> FrameLoop {
        let cancel_handle = CancelHandle::new();
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let interval = interval.max(Duration::from_millis(1));
        let notify = Arc::new(Notify::new());

        let thread = {
            let cancel_handle = cancel_handle.clone();
            let notify = notify.clone();
            thread::spawn(move || {
                let span = span!(Level::DEBUG, "frame loop");
                let _enter = span.enter();
                debug!(interval = ?interval, "Frame loop started");

                let mut deadline = Instant::now() + interval;
                loop {
                    let now = Instant::now();
                    if deadline > now + SPIN_MARGIN
                        && cancel_handle.wait_timeout(deadline - now - SPIN_MARGIN)
                    {
                        break;
                    }
                    spin_sleep::sleep(deadline.saturating_duration_since(Instant::now()));
                    if cancel_handle.is_cancelled() {
                        break;
                    }

                    // A full channel means the last tick is still unread.
                    if let Err(crossbeam_channel::TrySendError::Disconnected(_)) =
                        tick_tx.try_send(Instant::now())
                    {
                        break;
                    }
                    notify.notify_one();

                    deadline += interval;
                    let now = Instant::now();
                    if deadline < now {
                        deadline = now + interval;
                    }
                }
                debug!("Frame loop stopped");
            })
        };

        FrameLoop {
            cancel_handle,
            ticks: tick_rx,
            notify,
            thread: Some(thread),
        }
    }

    /// The receiving end of the ticks.
    pub fn ticks(&self) -> &Receiver<Instant> {
        &self.ticks
    }

    /// Woken once per tick. A wake that nobody waits for is kept until the
    /// next wait.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Takes a pending tick without blocking.
    pub fn try_tick(&self) -> Option<Instant> {
        match self.ticks.try_recv() {
            Ok(tick) => Some(tick),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.cancel_handle.is_cancelled()
    }

    /// Stops the loop and waits for its thread to exit.
    pub fn cancel(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_arrive() {
        let frames = FrameLoop::start(Duration::from_millis(5));
        for _ in 0..3 {
            assert!(frames
                .ticks()
                .recv_timeout(Duration::from_secs(1))
                .is_ok());
        }
        assert!(frames.is_running());
    }

    #[test]
    fn test_cancel_is_prompt_and_final() {
        let mut frames = FrameLoop::start(Duration::from_secs(10));
        let start = Instant::now();
        frames.cancel();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!frames.is_running());

        // The sender went away with the thread.
        assert!(frames
            .ticks()
            .recv_timeout(Duration::from_millis(50))
            .is_err());
        assert_eq!(None, frames.try_tick());

        // Cancelling twice is fine.
        frames.cancel();
    }

    #[tokio::test]
    async fn test_notifier_wakes_per_tick() {
        let frames = FrameLoop::start(Duration::from_millis(5));
        let notify = frames.notifier();
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), notify.notified())
                .await
                .unwrap();
            frames.try_tick();
        }
    }

    #[test]
    fn test_ticks_do_not_queue() {
        let frames = FrameLoop::start(Duration::from_millis(2));
        thread::sleep(Duration::from_millis(50));
        // Only one tick is buffered while nobody is reading.
        assert!(frames.ticks().len() <= 1);
        assert!(frames.try_tick().is_some());
    }
}
