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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Priority used for the render callback when SAMPLEDECK_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_PRIORITY: u8 = 70;

/// Reads SAMPLEDECK_THREAD_PRIORITY (0-99). Called once when the stream is
/// built, never from the callback.
pub fn callback_priority() -> u8 {
    std::env::var("SAMPLEDECK_THREAD_PRIORITY")
        .ok()
        .and_then(|value| value.parse::<u8>().ok())
        .filter(|value| *value < 100)
        .unwrap_or(DEFAULT_CALLBACK_PRIORITY)
}

/// Raises the priority of the calling thread the first time it's called on
/// that callback. `applied` is owned by the callback closure.
pub fn promote_callback_thread(priority: u8, applied: &mut bool) {
    if *applied {
        return;
    }
    *applied = true;

    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(_) => return,
    };
    match set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => info!(priority, "Raised render callback priority"),
        Err(e) => warn!(error = ?e, "Unable to raise render callback priority"),
    }
}
