//! Shared, mutable session context the state machines read and write
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::events::FormReport;
use crate::logic::link_states::LinkState;
use crate::logic::session_states::SessionPhase;
use serde::Serialize;

/// Identifier of one controller instance, carried on every telemetry packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture device status, surfaced as a degraded-state indicator. A failed
/// camera never aborts the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Initializing,
    Active,
    Failed(String),
}

/// Display-side mirror of where the upload stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadIndicator {
    Idle,
    InFlight,
    Uploaded,
    Failed,
}

/// Rolling per-session frame counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    /// Estimator callbacks seen, with or without a body in view.
    pub seen: u64,
    /// Frames that failed the whole-body visibility gate.
    pub without_body: u64,
    /// Payloads actually handed to the classifier link.
    pub forwarded: u64,
}

/// Per-session, in-memory state. The phase and link fields are owned by their
/// registries and committed by the controller after each event.
pub struct SessionContext {
    /// Current session phase (NotStarted -> .. -> Completed)
    pub(crate) phase: SessionPhase,
    /// Classifier connection state, fed by LinkUp/LinkDown
    pub(crate) link: LinkState,
    /// Identifier for telemetry and replay correlation
    pub(crate) session_id: SessionId,
    /// Exercise selector sent with every outbound payload
    pub exercise: String,
    /// Repetition count; clamped non-decreasing while a session runs
    pub rep_count: u32,
    /// Opaque movement stage string from the classifier ("up", "down", ...)
    pub stage: Option<String>,
    /// Latest coaching feedback line from the classifier
    pub feedback: String,
    /// End-gesture hold progress in [0, 100], classifier-reported
    pub gesture_progress: f64,
    /// Whole-body visibility verdict for the latest frame
    pub body_visible: bool,
    /// Steady-state camera guidance for the user, None when body is in view
    pub user_message: Option<&'static str>,
    /// Capture device indicator
    pub camera: CameraStatus,
    /// Upload progress indicator
    pub upload: UploadIndicator,
    /// End-of-session form summary, kept once reported
    pub report: Option<FormReport>,
    /// Set when the completion transition has fired, so duplicate completion
    /// snapshots cannot re-run its side effects
    pub(crate) completion_fired: bool,
    pub frames: FrameStats,
}

impl SessionContext {
    pub(crate) fn new(exercise: String) -> Self {
        Self {
            phase: SessionPhase::NotStarted,
            link: LinkState::Offline,
            session_id: SessionId::new(),
            exercise,
            rep_count: 0,
            stage: None,
            feedback: String::new(),
            gesture_progress: 0.0,
            body_visible: false,
            user_message: None,
            camera: CameraStatus::Initializing,
            upload: UploadIndicator::Idle,
            report: None,
            completion_fired: false,
            frames: FrameStats::default(),
        }
    }

    /// Wipe the per-session counters when the user presses start.
    pub(crate) fn reset_for_start(&mut self) {
        self.rep_count = 0;
        self.stage = None;
        self.feedback.clear();
        self.gesture_progress = 0.0;
        self.report = None;
        self.completion_fired = false;
        self.upload = UploadIndicator::Idle;
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Connection indicator; flips on disconnect and back on reconnect
    /// without ever touching the phase.
    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Online
    }
}
