//! Fixed thresholds and strings shared across the pipeline
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

/// A landmark counts as visible only strictly above this confidence.
pub const VISIBILITY_THRESHOLD: f64 = 0.5;

/// Gesture progress value at which the end gesture commits the session.
pub const GESTURE_COMPLETE: f64 = 100.0;

/// Shown while the estimator reports no landmarks at all.
pub const NO_PERSON_MESSAGE: &str = "No person detected";

/// Shown while some required landmark is missing or below threshold.
pub const PARTIAL_BODY_MESSAGE: &str = "Adjust camera to view whole body";

/// File name the recording is uploaded under.
pub const UPLOAD_FILE_NAME: &str = "exercise_session.webm";

/// MIME type of the recorded container.
pub const UPLOAD_MIME: &str = "video/webm";
