//! Settings loading.
//!
//! The settings file is line oriented: `key=value`, with blank lines and
//! `#` comments ignored. Only `video_dir` and `base_name` are required.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{LabelerError, Result};

/// Camera channels recorded by the capture rig, in display order.
pub const DEFAULT_CHANNELS: [&str; 8] = ["L0", "L1", "L2", "F0", "B0", "R0", "R1", "R2"];
pub const DEFAULT_REFERENCE_CHANNEL: &str = "F0";
pub const DEFAULT_MIN_SEGMENT_LENGTH: u64 = 150;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub video_dir: PathBuf,
    pub base_name: String,
    pub min_segment_length: u64,
    pub output_folder: PathBuf,
    pub channels: Vec<String>,
    pub reference_channel: String,
    pub video_ext: String,
    /// Size of a single frame for the raw video backend.
    pub frame_bytes: usize,
    pub jump_step: i64,
    pub tick_interval_ms: u64,
}

impl AppConfig {
    /// Builds a configuration for the given footage with every optional
    /// setting at its default.
    pub fn new(video_dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            video_dir: video_dir.into(),
            base_name: base_name.into(),
            min_segment_length: DEFAULT_MIN_SEGMENT_LENGTH,
            output_folder: PathBuf::from("outputs"),
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            reference_channel: DEFAULT_REFERENCE_CHANNEL.to_string(),
            video_ext: "raw".to_string(),
            frame_bytes: 640 * 360 * 3,
            jump_step: 100,
            tick_interval_ms: 30,
        }
    }

    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LabelerError::not_found("settings file", path));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses settings text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut video_dir = None;
        let mut base_name = None;
        let mut config = Self::new(PathBuf::new(), String::new());

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(LabelerError::invalid(
                    format!("line {}", number + 1),
                    line,
                    "expected `key=value`",
                ));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "video_dir" => video_dir = Some(PathBuf::from(value)),
                "base_name" => base_name = Some(value.to_string()),
                "min_segment_length" => config.min_segment_length = parse_number(key, value)?,
                "output_folder" => config.output_folder = PathBuf::from(value),
                "channels" => {
                    config.channels = value
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "reference_channel" => config.reference_channel = value.to_string(),
                "video_ext" => config.video_ext = value.trim_start_matches('.').to_string(),
                "frame_bytes" => config.frame_bytes = parse_number(key, value)?,
                "jump_step" => config.jump_step = parse_number(key, value)?,
                "tick_interval_ms" => config.tick_interval_ms = parse_number(key, value)?,
                other => tracing::warn!(key = other, "ignoring unknown setting"),
            }
        }

        config.video_dir = video_dir
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(LabelerError::MissingSetting("video_dir"))?;
        config.base_name = base_name
            .filter(|name| !name.is_empty())
            .ok_or(LabelerError::MissingSetting("base_name"))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field constraints of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.min_segment_length == 0 {
            return Err(LabelerError::invalid(
                "min_segment_length",
                "0",
                "must be at least one frame",
            ));
        }
        if self.channels.is_empty() {
            return Err(LabelerError::invalid("channels", "", "no channels listed"));
        }
        if !self.channels.contains(&self.reference_channel) {
            return Err(LabelerError::invalid(
                "reference_channel",
                &self.reference_channel,
                "not one of the configured channels",
            ));
        }
        if self.frame_bytes == 0 {
            return Err(LabelerError::invalid("frame_bytes", "0", "must be positive"));
        }
        if self.jump_step <= 0 {
            return Err(LabelerError::invalid(
                "jump_step",
                self.jump_step.to_string(),
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Resolves `{video_dir}/{base_name}{channel}.{video_ext}` for every
    /// channel, in declared order.
    pub fn channel_paths(&self) -> Vec<(String, PathBuf)> {
        self.channels
            .iter()
            .map(|channel| {
                let file = format!("{}{}.{}", self.base_name, channel, self.video_ext);
                (channel.clone(), self.video_dir.join(file))
            })
            .collect()
    }

    /// Location of the annotation log for this footage.
    pub fn log_path(&self) -> PathBuf {
        self.output_folder.join(format!("{}.csv", self.base_name))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| LabelerError::msg(format!("failed to serialise config: {err}")))
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err: T::Err| LabelerError::invalid(key, value, err.to_string()))
}
