//! Per-frame visibility gate: decides whether the whole body is in view
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::{NO_PERSON_MESSAGE, PARTIAL_BODY_MESSAGE, VISIBILITY_THRESHOLD};
use crate::pose::landmarks::{RawLandmark, REQUIRED_VISIBLE};

/// Verdict for one estimator callback.
/// The message is steady-state guidance for the user, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestReport {
    pub body_visible: bool,
    pub user_message: Option<&'static str>,
}

/// Classify a frame: no landmarks at all, partial body, or whole body in view.
/// A required index missing from a short list counts the same as low
/// visibility.
pub fn assess(landmarks: Option<&[RawLandmark]>) -> IngestReport {
    match landmarks {
        None => IngestReport {
            body_visible: false,
            user_message: Some(NO_PERSON_MESSAGE),
        },
        Some(points) => {
            if whole_body_visible(points) {
                IngestReport {
                    body_visible: true,
                    user_message: None,
                }
            } else {
                IngestReport {
                    body_visible: false,
                    user_message: Some(PARTIAL_BODY_MESSAGE),
                }
            }
        }
    }
}

fn whole_body_visible(points: &[RawLandmark]) -> bool {
    REQUIRED_VISIBLE
        .iter()
        .all(|&idx| matches!(points.get(idx), Some(p) if p.visibility > VISIBILITY_THRESHOLD))
}
