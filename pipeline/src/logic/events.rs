//! Session events and the wire payloads they carry
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::pose::landmarks::RawLandmark;
use crate::pose::normalize::NormalizedPose;
use crate::recording::UploadOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything that can happen to a session, from any source: camera frames,
/// recorder chunks, classifier messages, user actions, transport status and
/// the upload continuation. All sources funnel into one queue and are
/// processed in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    Frame { landmarks: Option<Vec<RawLandmark>> },
    Chunk { data: Vec<u8> },
    Stats(StatsUpdate),
    StartPressed,
    LinkUp,
    LinkDown,
    CameraReady,
    CameraFailed { reason: String },
    RecorderStopped,
    UploadResolved { outcome: UploadOutcome },
}

/// Authoritative snapshot from the classifier. Every message carries the full
/// session view; fields are folded into context wholesale, not merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdate {
    pub reps: u32,
    pub feedback: String,
    #[serde(default)]
    pub stage: Option<String>,
    pub completed: bool,
    pub is_active: bool,
    pub gesture_progress: f64,
    #[serde(default)]
    pub report: Option<FormReport>,
}

/// End-of-session form summary the classifier attaches to its completion
/// snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormReport {
    pub score: u32,
    pub mistakes: Vec<String>,
    pub summary: String,
}

/// Outbound per-frame payload: the exercise selector plus the normalized
/// name-keyed landmarks and the joint angles computed from them. The
/// session-start command carries no payload of its own; the exercise selector
/// on every frame is what the classifier keys on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePayload {
    #[serde(rename = "type")]
    pub exercise: String,
    pub landmarks: NormalizedPose,
    pub angles: BTreeMap<String, f64>,
}
