//! Monitor configuration file handling
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::Context;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

fn default_frame_interval_ms() -> u64 {
    50
}

fn default_output_dir() -> String {
    "output".to_string()
}

/// Everything the monitor needs to talk to the outside world, loaded from a
/// YAML file. See example_monitor.yaml for a filled-in sample.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// WebSocket endpoint of the exercise classifier
    pub classifier_url: String,
    /// HTTP endpoint the finished recording is posted to
    pub upload_url: String,
    /// Account the finished video is filed under. Leaving it empty makes the
    /// upload fail locally without touching the network.
    #[serde(default)]
    pub user_id: String,
    /// Exercise selector sent to the classifier with every payload
    pub exercise: String,
    /// Pacing of scripted camera frames
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Base directory for telemetry and replay output
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let file = File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        let config = serde_yml::from_reader(file)
            .with_context(|| format!("malformed config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let config: MonitorConfig = serde_yml::from_str(
            "classifier_url: ws://localhost:8765\n\
             upload_url: http://localhost:5000/api/upload-video\n\
             user_id: trainee-42\n\
             exercise: Squats\n\
             frame_interval_ms: 33\n\
             output_dir: /tmp/repwatch\n",
        )
        .unwrap();
        assert_eq!(config.classifier_url, "ws://localhost:8765");
        assert_eq!(config.user_id, "trainee-42");
        assert_eq!(config.exercise, "Squats");
        assert_eq!(config.frame_interval_ms, 33);
        assert_eq!(config.output_dir, "/tmp/repwatch");
    }

    #[test]
    fn optional_fields_take_defaults() {
        let config: MonitorConfig = serde_yml::from_str(
            "classifier_url: ws://localhost:8765\n\
             upload_url: http://localhost:5000/api/upload-video\n\
             exercise: Push-ups\n",
        )
        .unwrap();
        assert!(config.user_id.is_empty());
        assert_eq!(config.frame_interval_ms, 50);
        assert_eq!(config.output_dir, "output");
    }
}
