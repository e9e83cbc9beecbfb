//! IF streaming parameters and how they are pushed to the device

use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    device::{DeviceApi, DeviceSession},
    error::{Error, Operation, Result},
};

/// What the device appends to the base name of each segment file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuffixPolicy {
    None,
    Timestamp,
    IncrementingIndex,
}

impl SuffixPolicy {
    /// Vendor `IFSSDFN_SUFFIX_*` value
    pub fn code(self) -> i32 {
        match self {
            SuffixPolicy::None => -1,
            SuffixPolicy::Timestamp => 1,
            SuffixPolicy::IncrementingIndex => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Self-contained `.r3f` files
    Formatted,
    /// Split `.r3h` header and `.r3a` data files
    Framed,
}

impl OutputMode {
    pub fn code(self) -> i32 {
        match self {
            OutputMode::Formatted => 0,
            OutputMode::Framed => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub output_dir: PathBuf,
    pub filename_base: String,
    pub suffix: SuffixPolicy,
    pub segment_duration_ms: u32,
    /// Number of segments the device writes before going inactive
    pub retained_segment_count: u32,
    pub output_mode: OutputMode,
}

impl StreamConfig {
    /// Nominal capture time covered by all segments
    pub fn scheduled_ms(&self) -> u64 {
        self.segment_duration_ms as u64 * self.retained_segment_count as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.filename_base.is_empty() {
            return Err(Error::InvalidParameter("empty filename base".to_owned()));
        }
        if self.segment_duration_ms == 0 {
            return Err(Error::InvalidParameter(
                "segment duration must be at least 1 ms".to_owned(),
            ));
        }
        if self.retained_segment_count == 0 {
            return Err(Error::InvalidParameter(
                "retained segment count must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Size in MiB of one segment of 16 bit IF samples
pub fn estimate_file_size_mib(sample_rate_hz: f64, segment_duration_ms: u32) -> f64 {
    sample_rate_hz * (segment_duration_ms as f64 / 1000.0) * 2.0 / (1024.0 * 1024.0)
}

pub struct StreamConfigurator;

impl StreamConfigurator {
    /// Create the output directory and push every streaming parameter.
    /// Either all parameters are applied or an error is returned.
    pub fn apply<D: DeviceApi>(session: &mut DeviceSession<D>, config: &StreamConfig) -> Result<()> {
        config.validate()?;
        info!("Configuring IF streaming parameters...");
        if !config.output_dir.exists() {
            fs::create_dir_all(&config.output_dir)
                .map_err(|e| Error::fs("creating output directory", &config.output_dir, e))?;
            info!("Created directory: {}", config.output_dir.display());
        }
        session.call(Operation::SetDiskFilePath, |d| {
            d.set_stream_path(&config.output_dir)
        })?;
        session.call(Operation::SetDiskFilenameBase, |d| {
            d.set_stream_filename_base(&config.filename_base)
        })?;
        session.call(Operation::SetDiskFilenameSuffix, |d| {
            d.set_stream_suffix(config.suffix)
        })?;
        session.call(Operation::SetDiskFileLength, |d| {
            d.set_stream_file_length(config.segment_duration_ms)
        })?;
        session.call(Operation::SetDiskFileMode, |d| {
            d.set_stream_file_mode(config.output_mode)
        })?;
        session.call(Operation::SetDiskFileCount, |d| {
            d.set_stream_file_count(config.retained_segment_count)
        })?;
        info!(
            dir = %config.output_dir.display(),
            base = %config.filename_base,
            segment_ms = config.segment_duration_ms,
            segments = config.retained_segment_count,
            "IF streaming parameters configured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StatusKind,
        sim::{SimSettings, SimulatedDevice},
    };

    fn config(dir: PathBuf) -> StreamConfig {
        StreamConfig {
            output_dir: dir,
            filename_base: "if_capture".to_owned(),
            suffix: SuffixPolicy::IncrementingIndex,
            segment_duration_ms: 5,
            retained_segment_count: 4,
            output_mode: OutputMode::Formatted,
        }
    }

    #[test]
    fn test_apply_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("temp");
        let mut session = DeviceSession::new(SimulatedDevice::new(SimSettings::default()));
        session.connect(None).unwrap();
        StreamConfigurator::apply(&mut session, &config(dir.clone())).unwrap();
        assert!(dir.is_dir());
        let stream = session.api().stream_settings();
        assert_eq!(stream.path.as_deref(), Some(dir.as_path()));
        assert_eq!(stream.file_length_ms, 5);
        assert_eq!(stream.file_count, 4);
    }

    #[test]
    fn test_rejected_parameter() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = SimulatedDevice::new(SimSettings::default());
        sim.fail(Operation::SetDiskFileCount, StatusKind::PARAMETER);
        let mut session = DeviceSession::new(sim);
        session.connect(None).unwrap();
        let err = StreamConfigurator::apply(&mut session, &config(tmp.path().into())).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration {
                op: Operation::SetDiskFileCount,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_call() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = SimulatedDevice::new(SimSettings::default());
        sim.unsupported(Operation::SetDiskFileMode);
        let mut session = DeviceSession::new(sim);
        session.connect(None).unwrap();
        let err = StreamConfigurator::apply(&mut session, &config(tmp.path().into())).unwrap_err();
        assert!(matches!(err, Error::NotSupported { .. }));
    }

    #[test]
    fn test_local_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = DeviceSession::new(SimulatedDevice::new(SimSettings::default()));
        let mut bad = config(tmp.path().into());
        bad.segment_duration_ms = 0;
        assert!(matches!(
            StreamConfigurator::apply(&mut session, &bad),
            Err(Error::InvalidParameter(_))
        ));
        // Nothing reached the device
        assert!(session.api().calls().is_empty());
    }

    #[test]
    fn test_file_size_estimate() {
        // 112 Msps for one second of 16 bit samples
        let mib = estimate_file_size_mib(112e6, 1000);
        assert!((mib - 213.623).abs() < 1e-3);
    }
}
