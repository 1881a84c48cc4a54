use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::drivers::SignalError;

/// Which channels become display rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Every channel, whatever its flags.
    All,
    /// Only channels that are both enabled and visible.
    #[default]
    EnabledVisible,
}

/// How time-axis headers are printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAxis {
    #[default]
    SampleIndex,
    Seconds,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSpec {
    pub resource_path: PathBuf,
    pub channel_file: String,
    pub label: Option<String>,
    pub enabled: bool,
    pub visible: bool,
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self {
            resource_path: PathBuf::from("."),
            channel_file: String::new(),
            label: None,
            enabled: true,
            visible: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Keep one epoch out of this many for display.
    pub downsample_factor: usize,
    /// Fixed row count of the buffer.
    pub channel_count: usize,
    /// True acquisition rate, used for time headers.
    pub sample_rate_hz: f64,
    /// Samples per channel in each replayed epoch.
    pub epoch_width: usize,
    /// Pause between replayed epochs; 0 replays as fast as possible.
    pub replay_interval_ms: u64,
    /// Stop the replay after this many epochs. `None` runs until stopped.
    pub max_epochs: Option<usize>,
    pub row_policy: RowPolicy,
    pub time_axis: TimeAxis,
    pub channels: Vec<ChannelSpec>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            downsample_factor: 1,
            channel_count: 8,
            sample_rate_hz: 250.0,
            epoch_width: 16,
            replay_interval_ms: 0,
            max_epochs: Some(64),
            row_policy: RowPolicy::default(),
            time_axis: TimeAxis::default(),
            channels: Vec::new(),
        }
    }
}

impl StreamConfig {
    pub fn from_json_str(text: &str) -> Result<Self, SignalError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SignalError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.downsample_factor == 0 {
            return Err(SignalError::InvalidConfig(
                "downsample_factor must be at least 1".into(),
            ));
        }
        if self.channel_count == 0 {
            return Err(SignalError::InvalidConfig(
                "channel_count must be at least 1".into(),
            ));
        }
        if !(self.sample_rate_hz > 0.0) {
            return Err(SignalError::InvalidConfig(
                "sample_rate_hz must be greater than zero".into(),
            ));
        }
        if self.epoch_width == 0 {
            return Err(SignalError::InvalidConfig(
                "epoch_width must be at least 1".into(),
            ));
        }
        if !self.channels.is_empty() && self.channels.len() != self.channel_count {
            return Err(SignalError::InvalidConfig(format!(
                "{} channel entries for channel_count {}",
                self.channels.len(),
                self.channel_count
            )));
        }
        Ok(())
    }
}
