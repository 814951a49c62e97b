//! Scripted stand-in for the capture device
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use repwatch_pipeline::logic::events::SessionEvent;
use repwatch_pipeline::traits::Recorder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

/// Recorder backed by the session script instead of real capture hardware.
/// Start and stop just flip the shared armed flag the script player reads;
/// the stop confirmation travels through the event queue like a real
/// device's would.
pub struct ScriptRecorder {
    armed: Arc<AtomicBool>,
    events: mpsc::Sender<SessionEvent>,
}

impl ScriptRecorder {
    pub fn new(events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Handle for the script player's chunk gating.
    pub fn armed_flag(&self) -> Arc<AtomicBool> {
        self.armed.clone()
    }
}

impl Recorder for ScriptRecorder {
    fn start(&mut self) -> Result<(), anyhow::Error> {
        self.armed.store(true, Ordering::Relaxed);
        info!("recorder started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), anyhow::Error> {
        self.armed.store(false, Ordering::Relaxed);
        self.events.send(SessionEvent::RecorderStopped)?;
        info!("recorder stopped");
        Ok(())
    }
}
