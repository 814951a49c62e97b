//! Joint angle extraction from a normalized pose
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::pose::normalize::NormalizedPose;
use std::collections::BTreeMap;

/// Joints the classifier consumes, each defined by the (A, B, C) triple whose
/// interior angle at B is reported.
pub const TRACKED_JOINTS: [(&str, [&str; 3]); 4] = [
    ("left_elbow", ["left_shoulder", "left_elbow", "left_wrist"]),
    ("right_elbow", ["right_shoulder", "right_elbow", "right_wrist"]),
    ("left_knee", ["left_hip", "left_knee", "left_ankle"]),
    ("right_knee", ["right_hip", "right_knee", "right_ankle"]),
];

/// Interior angle at vertex `b` spanned by `a` and `c`, in degrees, using the
/// x/y plane only. Always lands in [0, 180].
pub fn interior_angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let rad = (c.1 - b.1).atan2(c.0 - b.0) - (a.1 - b.1).atan2(a.0 - b.0);
    let mut deg = rad.to_degrees().abs();
    if deg > 180.0 {
        deg = 360.0 - deg;
    }
    deg
}

/// Compute the tracked joint angles present in the pose. A joint whose triple
/// is incomplete is omitted, never zero-filled.
pub fn extract(pose: &NormalizedPose) -> BTreeMap<String, f64> {
    let mut angles = BTreeMap::new();
    for (joint, [a, b, c]) in TRACKED_JOINTS {
        let (Some(pa), Some(pb), Some(pc)) = (pose.get(a), pose.get(b), pose.get(c)) else {
            continue;
        };
        angles.insert(
            joint.to_string(),
            interior_angle((pa.x, pa.y), (pb.x, pb.y), (pc.x, pc.y)),
        );
    }
    angles
}
