//! Session phase handlers: idle, counting, end-gesture and completed
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::GESTURE_COMPLETE;
use crate::logic::context::{SessionContext, UploadIndicator};
use crate::logic::events::{FramePayload, SessionEvent, StatsUpdate};
use crate::logic::fsm::{StateHandler, TransitionDecision};
use crate::logic::intent::Intent;
use crate::pose::landmarks::RawLandmark;
use crate::pose::{angles, ingest, normalize};
use crate::recording::UploadOutcome;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one exercise session. Completed is terminal; a fresh
/// controller is built for the next session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    NotStarted,
    Active,
    EndingViaGesture,
    Completed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::NotStarted => "NotStarted",
            SessionPhase::Active => "Active",
            SessionPhase::EndingViaGesture => "EndingViaGesture",
            SessionPhase::Completed => "Completed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Waiting for the user to press start. Frames already flow to the classifier
/// so it can watch for the raise-hand start gesture; snapshots received here
/// only update the on-screen text, never the counters.
pub(crate) struct NotStartedState;

impl StateHandler<SessionPhase> for NotStartedState {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<SessionPhase> {
        match event {
            SessionEvent::Frame { landmarks } => {
                TransitionDecision::Stay(process_frame(ctx, landmarks.as_deref(), true))
            }
            SessionEvent::Stats(update) => {
                ctx.feedback = update.feedback.clone();
                ctx.stage = update.stage.clone();
                TransitionDecision::Stay(vec![Intent::NoOp])
            }
            SessionEvent::StartPressed => {
                ctx.reset_for_start();
                TransitionDecision::Transition {
                    to: SessionPhase::Active,
                    reason: "user pressed start".to_string(),
                    intents: vec![Intent::AnnounceStart, Intent::StartRecording],
                }
            }
            _ => TransitionDecision::Stay(vec![Intent::NoOp]),
        }
    }
}

/// Counting reps. Classifier snapshots are authoritative here; the handler
/// folds them in and watches for either completion signal.
pub(crate) struct ActiveState;

impl StateHandler<SessionPhase> for ActiveState {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<SessionPhase> {
        match event {
            SessionEvent::Frame { landmarks } => {
                TransitionDecision::Stay(process_frame(ctx, landmarks.as_deref(), true))
            }
            SessionEvent::Stats(update) => {
                apply_snapshot(ctx, update);
                if !ctx.completion_fired && completion_signaled(update) {
                    complete(ctx)
                } else if ctx.gesture_progress > 0.0 {
                    TransitionDecision::Transition {
                        to: SessionPhase::EndingViaGesture,
                        reason: "end gesture detected".to_string(),
                        intents: vec![],
                    }
                } else {
                    TransitionDecision::Stay(vec![Intent::NoOp])
                }
            }
            _ => TransitionDecision::Stay(vec![Intent::NoOp]),
        }
    }
}

/// The user is holding the end gesture. Counting continues; dropping the
/// gesture before it completes falls back to Active, holding it to the end
/// completes the session like the completed flag would.
pub(crate) struct EndingViaGestureState;

impl StateHandler<SessionPhase> for EndingViaGestureState {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<SessionPhase> {
        match event {
            SessionEvent::Frame { landmarks } => {
                TransitionDecision::Stay(process_frame(ctx, landmarks.as_deref(), true))
            }
            SessionEvent::Stats(update) => {
                apply_snapshot(ctx, update);
                if !ctx.completion_fired && completion_signaled(update) {
                    complete(ctx)
                } else if ctx.gesture_progress <= 0.0 {
                    TransitionDecision::Transition {
                        to: SessionPhase::Active,
                        reason: "end gesture released".to_string(),
                        intents: vec![],
                    }
                } else {
                    TransitionDecision::Stay(vec![Intent::NoOp])
                }
            }
            _ => TransitionDecision::Stay(vec![Intent::NoOp]),
        }
    }
}

/// Terminal phase. Late snapshots are ignored so the final numbers stay
/// frozen; the remaining work is the stop-confirmation and upload chain.
pub(crate) struct CompletedState;

impl StateHandler<SessionPhase> for CompletedState {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<SessionPhase> {
        match event {
            // The gate indicators keep tracking the camera, but nothing is
            // forwarded once the session is over.
            SessionEvent::Frame { landmarks } => {
                TransitionDecision::Stay(process_frame(ctx, landmarks.as_deref(), false))
            }
            SessionEvent::RecorderStopped => {
                if ctx.upload == UploadIndicator::Idle {
                    ctx.upload = UploadIndicator::InFlight;
                    TransitionDecision::Stay(vec![Intent::BeginUpload {
                        reps: ctx.rep_count,
                    }])
                } else {
                    TransitionDecision::Stay(vec![Intent::NoOp])
                }
            }
            SessionEvent::UploadResolved { outcome } => {
                ctx.upload = match outcome {
                    UploadOutcome::Uploaded => UploadIndicator::Uploaded,
                    UploadOutcome::Failed(_) => UploadIndicator::Failed,
                };
                TransitionDecision::Stay(vec![Intent::NoOp])
            }
            _ => TransitionDecision::Stay(vec![Intent::NoOp]),
        }
    }
}

/// Frame bookkeeping shared by every phase: run the visibility gate, update
/// the on-screen indicators, and when `forward` is set emit the normalized
/// payload. The gate never blocks forwarding; the classifier sees whatever
/// the camera saw, and a gate miss only drives the user prompt.
fn process_frame(
    ctx: &mut SessionContext,
    landmarks: Option<&[RawLandmark]>,
    forward: bool,
) -> Vec<Intent> {
    ctx.frames.seen += 1;
    let report = ingest::assess(landmarks);
    ctx.body_visible = report.body_visible;
    ctx.user_message = report.user_message;
    if !report.body_visible {
        ctx.frames.without_body += 1;
    }

    if !forward {
        return vec![Intent::NoOp];
    }
    let Some(points) = landmarks else {
        return vec![Intent::NoOp];
    };
    let Some(pose) = normalize::center_on_hips(points) else {
        debug!("frame has no hip landmarks, nothing to forward");
        return vec![Intent::NoOp];
    };
    let angles = angles::extract(&pose);
    vec![Intent::ForwardFrame(FramePayload {
        exercise: ctx.exercise.clone(),
        landmarks: pose,
        angles,
    })]
}

/// Fold an authoritative classifier snapshot into the context. Reps are
/// clamped non-decreasing so a classifier restart cannot wipe progress off
/// the display, and a form report survives once received.
fn apply_snapshot(ctx: &mut SessionContext, update: &StatsUpdate) {
    ctx.rep_count = ctx.rep_count.max(update.reps);
    ctx.feedback = update.feedback.clone();
    ctx.stage = update.stage.clone();
    ctx.gesture_progress = update.gesture_progress.clamp(0.0, GESTURE_COMPLETE);
    if let Some(report) = &update.report {
        ctx.report = Some(report.clone());
    }
}

/// Either completion signal: the explicit flag, or the end gesture held all
/// the way through.
fn completion_signaled(update: &StatsUpdate) -> bool {
    update.completed || update.gesture_progress >= GESTURE_COMPLETE
}

/// The one place the session completes. The guard flag in the context keeps
/// this from ever firing twice, whatever the snapshot stream does.
fn complete(ctx: &mut SessionContext) -> TransitionDecision<SessionPhase> {
    ctx.completion_fired = true;
    TransitionDecision::Transition {
        to: SessionPhase::Completed,
        reason: format!("classifier reported completion at {} reps", ctx.rep_count),
        intents: vec![Intent::StopRecording],
    }
}
