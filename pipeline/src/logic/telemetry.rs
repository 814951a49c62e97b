//! Structured JSONL telemetry for one session run
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::context::SessionId;
use crate::logic::intent::Intent;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the epoch for packet timestamps.
pub(crate) fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// One structured telemetry line. Every packet carries the session id so
/// runs can be correlated across log files.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum TelemetryPacket<'a> {
    // Snapshot of queue and state at each controller tick
    TickStats {
        ts: u128,
        session: SessionId,
        phase: &'static str,
        link: &'static str,
        connected: bool,
        event_queue_len: usize,
        max_event_queue_len: usize,
    },
    // Phase or link FSM state change
    FsmTransition {
        session: SessionId,
        from: &'a str,
        to: &'a str,
        reason: &'a str,
    },
    // Duration spent in the state just left
    StateDuration {
        session: SessionId,
        ts: u128,
        fsm: &'a str,
        state: &'a str,
        duration_ms: u128,
    },
    // Classifier snapshot as it arrived
    StatsSnapshot {
        session: SessionId,
        ts: u128,
        reps: u32,
        completed: bool,
        gesture_progress: f64,
    },
    // Each dispatched intent (NoOp excluded)
    IntentTriggered {
        session: SessionId,
        intent: &'a Intent,
        ts: u128,
    },
    // Upload begin and resolution
    Upload {
        session: SessionId,
        ts: u128,
        status: &'a str,
        bytes: usize,
    },
    // Written once at shutdown
    SessionSummary {
        session: SessionId,
        ts: u128,
        phase: &'static str,
        reps: u32,
        frames_seen: u64,
        frames_forwarded: u64,
        dropped_chunks: u64,
        reason: &'a str,
    },
}

/// Telemetry sink for a single run: a line-per-packet log under
/// `<base>/runs/<timestamp>/`. When not activated, writes are no-ops so the
/// call sites stay unconditional.
pub struct TelemetryRun {
    pub run_id: String,
    log: Option<File>,
    run_dir: Option<PathBuf>,
}

impl TelemetryRun {
    pub fn new(activated: bool, base: &Path) -> Result<Self, anyhow::Error> {
        let run_id = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

        if activated {
            let dir = base.join("runs").join(&run_id);
            std::fs::create_dir_all(&dir)?;
            let log = OpenOptions::new()
                .append(true)
                .create(true)
                .open(dir.join("telemetry.log"))?;
            Ok(Self {
                run_id,
                log: Some(log),
                run_dir: Some(dir),
            })
        } else {
            Ok(Self {
                run_id,
                log: None,
                run_dir: None,
            })
        }
    }

    /// Serializes and writes a telemetry packet as one line of the log.
    pub(crate) fn write(&mut self, pkt: &TelemetryPacket) -> Result<(), anyhow::Error> {
        if let Some(log) = &mut self.log {
            let line = serde_json::to_string(pkt)?;
            writeln!(log, "{line}")?;
        }
        Ok(())
    }

    /// Directory of this run's output, None when telemetry is off.
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }
}
