//! Landmark layout of the pose estimator and the subset this pipeline consumes
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// One point of the estimator's fixed 33-slot body layout.
/// Coordinates are normalized to the camera frame; visibility is a
/// per-point confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
}

pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

/// Number of slots the estimator emits per frame.
pub const LANDMARK_COUNT: usize = 33;

/// Indices that must all be confidently visible for the whole body to count
/// as in frame: both shoulders, both hips, both ankles.
pub const REQUIRED_VISIBLE: [usize; 6] = [
    LEFT_SHOULDER,
    RIGHT_SHOULDER,
    LEFT_HIP,
    RIGHT_HIP,
    LEFT_ANKLE,
    RIGHT_ANKLE,
];

/// Points kept after normalization, in the name-keyed map sent downstream.
/// Everything else (face detail, hands, feet) is dropped.
pub const RETAINED: [(&str, usize); 13] = [
    ("nose", NOSE),
    ("left_shoulder", LEFT_SHOULDER),
    ("right_shoulder", RIGHT_SHOULDER),
    ("left_elbow", LEFT_ELBOW),
    ("right_elbow", RIGHT_ELBOW),
    ("left_wrist", LEFT_WRIST),
    ("right_wrist", RIGHT_WRIST),
    ("left_hip", LEFT_HIP),
    ("right_hip", RIGHT_HIP),
    ("left_knee", LEFT_KNEE),
    ("right_knee", RIGHT_KNEE),
    ("left_ankle", LEFT_ANKLE),
    ("right_ankle", RIGHT_ANKLE),
];
