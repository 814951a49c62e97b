//! Classifier link states and camera status folding
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::context::{CameraStatus, SessionContext};
use crate::logic::events::SessionEvent;
use crate::logic::fsm::{StateHandler, TransitionDecision};
use crate::logic::intent::Intent;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity to the classifier. Deliberately independent of the session
/// phase: losing the socket mid-session flips an indicator, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    Offline,
    Online,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Offline => "Offline",
            LinkState::Online => "Online",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct OfflineState;

impl StateHandler<LinkState> for OfflineState {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<LinkState> {
        match event {
            SessionEvent::LinkUp => TransitionDecision::Transition {
                to: LinkState::Online,
                reason: "classifier socket open".to_string(),
                intents: vec![],
            },
            other => {
                fold_camera(ctx, other);
                TransitionDecision::Stay(vec![Intent::NoOp])
            }
        }
    }
}

pub(crate) struct OnlineState;

impl StateHandler<LinkState> for OnlineState {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<LinkState> {
        match event {
            SessionEvent::LinkDown => TransitionDecision::Transition {
                to: LinkState::Offline,
                reason: "classifier socket closed".to_string(),
                intents: vec![],
            },
            other => {
                fold_camera(ctx, other);
                TransitionDecision::Stay(vec![Intent::NoOp])
            }
        }
    }
}

/// The camera is a degraded-state indicator, not a state machine of its own.
/// A failed camera never stops the session loop; frames simply stop arriving.
fn fold_camera(ctx: &mut SessionContext, event: &SessionEvent) {
    match event {
        SessionEvent::CameraReady => ctx.camera = CameraStatus::Active,
        SessionEvent::CameraFailed { reason } => {
            warn!("camera failed: {}", reason);
            ctx.camera = CameraStatus::Failed(reason.clone());
        }
        _ => {}
    }
}
