//! Timestamped capture of everything a session processed, for offline re-runs
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::events::SessionEvent;
use crate::logic::intent::Intent;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Timestamped wrapper for any recorded item (event or intent).
#[derive(Serialize, Deserialize)]
pub struct ReplayEntry<T> {
    pub when: SystemTime,
    pub item: T,
}

/// Timeline of events and intents for one session, saved as JSON next to the
/// telemetry log. Frames ride along inside their events, so no separate
/// frame capture is needed.
#[derive(Serialize, Deserialize, Default)]
pub struct ReplaySession {
    pub events: Vec<ReplayEntry<SessionEvent>>,
    pub intents: Vec<ReplayEntry<Intent>>,
}

impl ReplaySession {
    /// Records a session event into the timeline.
    pub fn record_event(&mut self, ev: &SessionEvent) {
        self.events.push(ReplayEntry {
            when: SystemTime::now(),
            item: ev.clone(),
        });
    }

    /// Records an intent that was executed during the session.
    pub fn record_intent(&mut self, intent: &Intent) {
        self.intents.push(ReplayEntry {
            when: SystemTime::now(),
            item: intent.clone(),
        });
    }

    /// Saves the recorded timeline to a JSON file at the specified path.
    pub fn save_to<P: AsRef<std::path::Path>>(&self, path: P) -> std::io::Result<()> {
        let f = std::fs::File::create(path)?;
        serde_json::to_writer(f, &self)?;
        Ok(())
    }

    /// Loads a timeline back from a JSON file.
    #[allow(dead_code)]
    pub fn load_from<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let f = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(f)?)
    }
}
