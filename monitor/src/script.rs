//! Scripted session input: a recorded timeline of camera and user activity
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::Context;
use repwatch_pipeline::logic::controller::SessionController;
use repwatch_pipeline::logic::events::SessionEvent;
use repwatch_pipeline::pose::landmarks::RawLandmark;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One entry of a session script. Frames pace themselves at the configured
/// interval; everything else fires immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// One estimator callback; a missing `landmarks` field means nobody was
    /// in view of the camera
    Frame {
        #[serde(default)]
        landmarks: Option<Vec<RawLandmark>>,
    },
    /// One recorder chunk of the given size, synthesized while the device
    /// is on
    Chunk { len: usize },
    /// The user presses the start button
    PressStart,
    /// Idle for the given wall time
    Wait { ms: u64 },
    /// The capture device reports failure
    CameraFailure { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScript {
    pub steps: Vec<ScriptStep>,
}

impl SessionScript {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let file = File::open(path)
            .with_context(|| format!("cannot open session script {}", path.display()))?;
        let script = serde_json::from_reader(file)
            .with_context(|| format!("malformed session script {}", path.display()))?;
        Ok(script)
    }
}

/// Feeds script steps into the controller one at a time, standing in for the
/// camera, the pose estimator and the user.
pub struct ScriptPlayer {
    steps: std::vec::IntoIter<ScriptStep>,
    /// Shared with the recorder; chunk steps only produce data while the
    /// device is on, like a real capture pipeline.
    armed: Arc<AtomicBool>,
    frame_interval: Duration,
}

impl ScriptPlayer {
    pub fn new(script: SessionScript, armed: Arc<AtomicBool>, frame_interval: Duration) -> Self {
        Self {
            steps: script.steps.into_iter(),
            armed,
            frame_interval,
        }
    }

    /// Plays the next step. Returns false once the script is exhausted.
    pub fn advance(&mut self, controller: &mut SessionController) -> bool {
        let Some(step) = self.steps.next() else {
            return false;
        };
        match step {
            ScriptStep::Frame { landmarks } => {
                controller.push_frame(landmarks);
                thread::sleep(self.frame_interval);
            }
            ScriptStep::Chunk { len } => {
                if self.armed.load(Ordering::Relaxed) {
                    controller.push_chunk(vec![0xC5; len]);
                }
            }
            ScriptStep::PressStart => controller.press_start(),
            ScriptStep::Wait { ms } => thread::sleep(Duration::from_millis(ms)),
            ScriptStep::CameraFailure { reason } => {
                controller.push_event(SessionEvent::CameraFailed { reason });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_kind_parses() {
        let script: SessionScript = serde_json::from_str(
            r#"{
                "steps": [
                    { "step": "frame" },
                    { "step": "frame", "landmarks": [
                        { "x": 0.5, "y": 0.5, "z": 0.0, "visibility": 0.9 }
                    ] },
                    { "step": "press_start" },
                    { "step": "chunk", "len": 4096 },
                    { "step": "wait", "ms": 100 },
                    { "step": "camera_failure", "reason": "device busy" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(script.steps.len(), 6);
        assert!(matches!(script.steps[0], ScriptStep::Frame { landmarks: None }));
        let ScriptStep::Frame {
            landmarks: Some(points),
        } = &script.steps[1]
        else {
            panic!("expected landmarks on the second frame");
        };
        assert_eq!(points.len(), 1);
        assert!(matches!(script.steps[3], ScriptStep::Chunk { len: 4096 }));
    }
}
