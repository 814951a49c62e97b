//! Hip-centered pose normalization
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::pose::landmarks::{RawLandmark, LEFT_HIP, RETAINED, RIGHT_HIP};
use std::collections::BTreeMap;

/// Name-keyed, hip-centered subset of one frame's landmarks.
pub type NormalizedPose = BTreeMap<String, RawLandmark>;

/// Re-express the retained landmarks relative to the midpoint of the two
/// hips. Visibility passes through untouched. Returns None when either hip
/// slot is absent, since there is no origin to center on.
pub fn center_on_hips(points: &[RawLandmark]) -> Option<NormalizedPose> {
    let left_hip = points.get(LEFT_HIP)?;
    let right_hip = points.get(RIGHT_HIP)?;

    let cx = (left_hip.x + right_hip.x) / 2.0;
    let cy = (left_hip.y + right_hip.y) / 2.0;
    let cz = (left_hip.z + right_hip.z) / 2.0;

    let mut pose = NormalizedPose::new();
    for (name, idx) in RETAINED {
        if let Some(p) = points.get(idx) {
            pose.insert(
                name.to_string(),
                RawLandmark {
                    x: p.x - cx,
                    y: p.y - cy,
                    z: p.z - cz,
                    visibility: p.visibility,
                },
            );
        }
    }

    Some(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::landmarks::LANDMARK_COUNT;

    fn sample_body() -> Vec<RawLandmark> {
        (0..LANDMARK_COUNT)
            .map(|i| RawLandmark {
                x: 0.3 + i as f64 * 0.013,
                y: 0.2 + i as f64 * 0.007,
                z: -0.1 + i as f64 * 0.002,
                visibility: 0.8,
            })
            .collect()
    }

    #[test]
    fn hips_average_to_the_origin() {
        let pose = center_on_hips(&sample_body()).unwrap();
        let lh = pose["left_hip"];
        let rh = pose["right_hip"];
        assert!((lh.x + rh.x).abs() < 1e-12);
        assert!((lh.y + rh.y).abs() < 1e-12);
        assert!((lh.z + rh.z).abs() < 1e-12);
    }

    #[test]
    fn invariant_under_translation() {
        let body = sample_body();
        let shifted: Vec<RawLandmark> = body
            .iter()
            .map(|p| RawLandmark {
                x: p.x + 1.7,
                y: p.y - 0.4,
                z: p.z + 0.25,
                visibility: p.visibility,
            })
            .collect();

        let a = center_on_hips(&body).unwrap();
        let b = center_on_hips(&shifted).unwrap();
        assert_eq!(a.len(), b.len());
        for (name, pa) in &a {
            let pb = &b[name];
            assert!((pa.x - pb.x).abs() < 1e-12, "{name} x drifted");
            assert!((pa.y - pb.y).abs() < 1e-12, "{name} y drifted");
            assert!((pa.z - pb.z).abs() < 1e-12, "{name} z drifted");
        }
    }

    #[test]
    fn only_the_allow_list_survives() {
        let pose = center_on_hips(&sample_body()).unwrap();
        assert_eq!(pose.len(), 13);
        assert!(pose.contains_key("nose"));
        assert!(!pose.contains_key("left_ear"));
    }

    #[test]
    fn visibility_passes_through() {
        let mut body = sample_body();
        body[0].visibility = 0.123;
        let pose = center_on_hips(&body).unwrap();
        assert_eq!(pose["nose"].visibility, 0.123);
    }

    #[test]
    fn missing_hip_slot_yields_none() {
        let body = sample_body()[..LEFT_HIP].to_vec();
        assert!(center_on_hips(&body).is_none());
    }

    #[test]
    fn short_list_omits_missing_points() {
        // Ankles and knees cut off; the map just shrinks.
        let body = sample_body()[..25].to_vec();
        let pose = center_on_hips(&body).unwrap();
        assert!(pose.contains_key("right_hip"));
        assert!(!pose.contains_key("left_knee"));
        assert!(!pose.contains_key("left_ankle"));
    }
}
