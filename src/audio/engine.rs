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

//! The gesture-gated engine lifecycle.
//!
//! Output is only allowed once the user has interacted with the application.
//! The surrounding application opens the gate on that first gesture and
//! anything waiting in [`Lifecycle::ensure_ready`] proceeds.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::{EngineHandle, EngineState};
use crate::error::WorkstationError;

/// A one-way flag that opens on the first user gesture.
#[derive(Clone, Debug)]
pub struct GestureGate {
    sender: Arc<watch::Sender<bool>>,
}

impl GestureGate {
    pub fn new() -> GestureGate {
        let (sender, _) = watch::channel(false);
        GestureGate {
            sender: Arc::new(sender),
        }
    }

    /// Opens the gate. Later calls do nothing.
    pub fn open(&self) {
        self.sender.send_if_modified(|open| {
            let changed = !*open;
            *open = true;
            changed
        });
    }

    pub fn is_open(&self) -> bool {
        *self.sender.borrow()
    }

    /// Waits for the gate to open.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as self, so this can't fail.
        let _ = receiver.wait_for(|open| *open).await;
    }
}

impl Default for GestureGate {
    fn default() -> Self {
        GestureGate::new()
    }
}

/// Ties an engine to the gesture gate that unlocks it.
pub struct Lifecycle {
    engine: EngineHandle,
    gate: GestureGate,
}

impl Lifecycle {
    pub fn new(engine: EngineHandle) -> Lifecycle {
        Lifecycle {
            engine,
            gate: GestureGate::new(),
        }
    }

    /// The gate to open on a user gesture.
    pub fn gate(&self) -> GestureGate {
        self.gate.clone()
    }

    /// The engine, ready or not.
    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    /// Resolves once the gate is open and the engine is running.
    pub async fn ensure_ready(&self) -> Result<EngineHandle, WorkstationError> {
        if self.engine.state() == EngineState::Closed {
            return Err(WorkstationError::Device(format!(
                "{} has been closed",
                self.engine
            )));
        }

        self.gate.wait().await;

        if self.engine.state() != EngineState::Running {
            self.engine.resume()?;
            info!(engine = %self.engine, "Audio engine resumed");
        }
        Ok(self.engine.clone())
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("engine", &self.engine.to_string())
            .field("state", &self.engine.state())
            .field("gate_open", &self.gate.is_open())
            .finish()
    }
}
