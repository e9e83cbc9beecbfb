//! Run settings, read from an optional TOML file.
//!
//! Every field has a default, so an empty (or absent) file describes the
//! usual 1420 MHz RAM-disk capture. Command line flags are applied on top by
//! the binary.
//!
//! ```toml
//! [device]
//! center_frequency_hz = 1420e6
//!
//! [stream]
//! temp_dir = "/mnt/ramdisk/IF_data_temp"
//! segment_ms = 100
//! record_seconds = 10.0
//!
//! [optimizer]
//! trials = 10
//! ```

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    stream::{OutputMode, StreamConfig, SuffixPolicy},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub stream: StreamSettings,
    pub acquisition: AcquisitionSettings,
    pub optimizer: OptimizerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub center_frequency_hz: f64,
    pub reference_level_dbm: f64,
    /// Connect to this instrument instead of the first one found
    pub serial: Option<String>,
    /// Only used to estimate file sizes
    pub sample_rate_hz: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            center_frequency_hz: 1420e6,
            reference_level_dbm: 0.0,
            serial: None,
            sample_rate_hz: 112e6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Where the device writes segments, ideally a RAM disk
    pub temp_dir: PathBuf,
    /// Where finished segments are moved to
    pub dest_dir: PathBuf,
    pub filename_base: String,
    pub suffix: SuffixPolicy,
    pub mode: OutputMode,
    pub segment_ms: u32,
    pub record_seconds: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("/mnt/ramdisk/IF_data_temp"),
            dest_dir: PathBuf::from("IF_data_dump"),
            filename_base: "if_capture".to_owned(),
            suffix: SuffixPolicy::Timestamp,
            mode: OutputMode::Formatted,
            segment_ms: 1,
            record_seconds: 0.002,
        }
    }
}

impl StreamSettings {
    /// Segments needed to cover the whole record
    pub fn segment_count(&self) -> u32 {
        if self.segment_ms == 0 {
            return 0;
        }
        let record_ms = self.record_seconds * 1000.0;
        ((record_ms / self.segment_ms as f64).ceil() as u32).max(1)
    }

    pub fn to_config(&self) -> StreamConfig {
        StreamConfig {
            output_dir: self.temp_dir.clone(),
            filename_base: self.filename_base.clone(),
            suffix: self.suffix,
            segment_duration_ms: self.segment_ms,
            retained_segment_count: self.segment_count(),
            output_mode: self.mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub poll_interval_ms: u64,
    /// Give up waiting for the stream to finish after this long
    pub drain_timeout_s: f64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            drain_timeout_s: 30.0,
        }
    }
}

impl AcquisitionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeouts too large for a `Duration` saturate; `Settings::validate` rejects them
    pub fn drain_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.drain_timeout_s).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub output_dir: PathBuf,
    pub total_seconds: f64,
    pub trials: usize,
    pub step_seconds: f64,
    /// Trials poll faster than a normal capture to time the drain precisely
    pub poll_interval_ms: u64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/mnt/ramdisk2/IF_data_temp"),
            total_seconds: 10.0,
            trials: 6,
            step_seconds: 0.2,
            poll_interval_ms: 1,
        }
    }
}

impl Settings {
    /// Read settings from `path`, or defaults when there is none
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|e| Error::fs("reading settings", path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.acquisition.poll_interval_ms == 0 || self.optimizer.poll_interval_ms == 0 {
            return Err(Error::InvalidParameter(
                "poll interval must be at least 1 ms".to_owned(),
            ));
        }
        let timeout_s = self.acquisition.drain_timeout_s;
        if !(timeout_s > 0.0) || Duration::try_from_secs_f64(timeout_s).is_err() {
            return Err(Error::InvalidParameter(format!(
                "drain timeout must be a positive number of seconds, got {timeout_s}"
            )));
        }
        if self.stream.segment_ms == 0 {
            return Err(Error::InvalidParameter(
                "segment length must be at least 1 ms".to_owned(),
            ));
        }
        if !(self.stream.record_seconds > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "record duration must be positive, got {}",
                self.stream.record_seconds
            )));
        }
        Ok(())
    }
}
