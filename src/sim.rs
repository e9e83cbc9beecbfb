//! An in-process stand-in for the spectrum analyzer.
//!
//! The simulator behaves like the real IF streamer from the outside: once run
//! and enabled it writes `file_count` segment files into the configured
//! directory, one every `file_length * time_scale + per_file_overhead`, and
//! reports itself active until the last one is on disk. Files are short text
//! placeholders, not IF samples. Faults can be injected per operation and every
//! call is recorded.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::{
    device::{DeviceApi, DeviceInfo},
    error::{ApiError, ApiResult, Operation, StatusKind},
    stream::{OutputMode, SuffixPolicy},
};

#[derive(Clone, Debug)]
pub struct SimSettings {
    /// (device type, serial number) of each instrument a search finds
    pub devices: Vec<(&'static str, &'static str)>,
    pub api_version: &'static str,
    /// Wall time spent per nominal millisecond of capture
    pub time_scale: f64,
    /// Fixed cost of finishing one segment file
    pub per_file_overhead: Duration,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            devices: vec![("RSA306B", "B010101")],
            api_version: "3.11.0047",
            time_scale: 1.0,
            per_file_overhead: Duration::from_millis(2),
        }
    }
}

/// Streaming parameters as last set on the simulator
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSettings {
    pub path: Option<PathBuf>,
    pub filename_base: String,
    pub suffix: SuffixPolicy,
    pub file_length_ms: u32,
    pub mode: OutputMode,
    pub file_count: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            path: None,
            filename_base: String::new(),
            suffix: SuffixPolicy::Timestamp,
            file_length_ms: 0,
            mode: OutputMode::Formatted,
            file_count: 1,
        }
    }
}

pub struct SimulatedDevice {
    settings: SimSettings,
    connected: Option<usize>,
    running: bool,
    center_frequency: f64,
    reference_level: f64,
    stream: StreamSettings,
    enabled_at: Option<(Instant, DateTime<Utc>)>,
    written: u32,
    stuck_active: bool,
    failures: HashMap<Operation, ApiError>,
    calls: Vec<Operation>,
}

impl SimulatedDevice {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            settings,
            connected: None,
            running: false,
            center_frequency: 0.0,
            reference_level: 0.0,
            stream: StreamSettings::default(),
            enabled_at: None,
            written: 0,
            stuck_active: false,
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Make every future `op` return status `code`
    pub fn fail(&mut self, op: Operation, code: i32) {
        self.failures.insert(op, ApiError::Status(code));
    }

    /// Make every future `op` report itself as unimplemented
    pub fn unsupported(&mut self, op: Operation) {
        self.failures.insert(op, ApiError::Unsupported);
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Report the stream as active forever, like a wedged firmware
    pub fn set_stuck_active(&mut self, stuck: bool) {
        self.stuck_active = stuck;
    }

    pub fn calls(&self) -> &[Operation] {
        &self.calls
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    pub fn reference_level(&self) -> f64 {
        self.reference_level
    }

    pub fn stream_settings(&self) -> &StreamSettings {
        &self.stream
    }

    fn enter(&mut self, op: Operation) -> ApiResult<()> {
        trace!(%op, "simulated call");
        self.calls.push(op);
        if let Some(err) = self.failures.get(&op) {
            return Err(*err);
        }
        let needs_connection = !matches!(
            op,
            Operation::GetApiVersion | Operation::Search | Operation::Connect
        );
        if needs_connection && self.connected.is_none() {
            return Err(ApiError::Status(StatusKind::NOT_CONNECTED));
        }
        Ok(())
    }

    fn segment_duration(&self) -> Duration {
        Duration::from_secs_f64(self.stream.file_length_ms as f64 * self.settings.time_scale / 1000.0)
            + self.settings.per_file_overhead
    }

    fn file_names(&self, index: u32, started: DateTime<Utc>) -> Vec<String> {
        let base = &self.stream.filename_base;
        let stem = match self.stream.suffix {
            SuffixPolicy::None => base.clone(),
            SuffixPolicy::IncrementingIndex => format!("{base}-{index:05}"),
            SuffixPolicy::Timestamp => {
                let offset = chrono::Duration::milliseconds(
                    index as i64 * self.stream.file_length_ms as i64,
                );
                format!("{base}-{}", (started + offset).format("%Y.%m.%d.%H.%M.%S%.3f"))
            }
        };
        match self.stream.mode {
            OutputMode::Formatted => vec![format!("{stem}.r3f")],
            OutputMode::Framed => vec![format!("{stem}.r3h"), format!("{stem}.r3a")],
        }
    }

    fn write_segments(&mut self, upto: u32, started: DateTime<Utc>) -> ApiResult<()> {
        let dir = self
            .stream
            .path
            .clone()
            .ok_or(ApiError::Status(StatusKind::PARAMETER))?;
        while self.written < upto {
            for name in self.file_names(self.written, started) {
                let body = format!(
                    "{} segment {} of {} ms\n",
                    self.stream.filename_base, self.written, self.stream.file_length_ms
                );
                fs::write(dir.join(name), body)
                    .map_err(|_| ApiError::Status(StatusKind::TRANSFER))?;
            }
            self.written += 1;
        }
        Ok(())
    }
}

impl DeviceApi for SimulatedDevice {
    fn api_version(&mut self) -> ApiResult<String> {
        self.enter(Operation::GetApiVersion)?;
        Ok(self.settings.api_version.to_owned())
    }

    fn search(&mut self) -> ApiResult<Vec<DeviceInfo>> {
        self.enter(Operation::Search)?;
        Ok(self
            .settings
            .devices
            .iter()
            .enumerate()
            .map(|(id, (device_type, serial))| DeviceInfo {
                id: id as i32,
                serial: serial.to_string(),
                device_type: device_type.to_string(),
            })
            .collect())
    }

    fn connect(&mut self, id: i32) -> ApiResult<()> {
        self.enter(Operation::Connect)?;
        if id < 0 || id as usize >= self.settings.devices.len() {
            return Err(ApiError::Status(StatusKind::PARAMETER));
        }
        self.connected = Some(id as usize);
        Ok(())
    }

    fn serial_number(&mut self) -> ApiResult<String> {
        self.enter(Operation::GetSerialNumber)?;
        self.connected
            .and_then(|id| self.settings.devices.get(id))
            .map(|(_, serial)| serial.to_string())
            .ok_or(ApiError::Status(StatusKind::NOT_CONNECTED))
    }

    fn disconnect(&mut self) -> ApiResult<()> {
        self.enter(Operation::Disconnect)?;
        self.connected = None;
        self.running = false;
        self.enabled_at = None;
        Ok(())
    }

    fn preset(&mut self) -> ApiResult<()> {
        self.enter(Operation::Preset)?;
        self.center_frequency = 1.5e9;
        self.reference_level = 0.0;
        Ok(())
    }

    fn set_center_frequency(&mut self, hz: f64) -> ApiResult<()> {
        self.enter(Operation::SetCenterFreq)?;
        if !(9e3..=6.2e9).contains(&hz) {
            return Err(ApiError::Status(StatusKind::PARAMETER));
        }
        self.center_frequency = hz;
        Ok(())
    }

    fn set_reference_level(&mut self, dbm: f64) -> ApiResult<()> {
        self.enter(Operation::SetReferenceLevel)?;
        if !(-130.0..=30.0).contains(&dbm) {
            return Err(ApiError::Status(StatusKind::PARAMETER));
        }
        self.reference_level = dbm;
        Ok(())
    }

    fn run(&mut self) -> ApiResult<()> {
        self.enter(Operation::Run)?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> ApiResult<()> {
        self.enter(Operation::Stop)?;
        self.running = false;
        Ok(())
    }

    fn set_stream_path(&mut self, path: &Path) -> ApiResult<()> {
        self.enter(Operation::SetDiskFilePath)?;
        if !path.is_dir() {
            return Err(ApiError::Status(StatusKind::PARAMETER));
        }
        self.stream.path = Some(path.to_path_buf());
        Ok(())
    }

    fn set_stream_filename_base(&mut self, base: &str) -> ApiResult<()> {
        self.enter(Operation::SetDiskFilenameBase)?;
        self.stream.filename_base = base.to_owned();
        Ok(())
    }

    fn set_stream_suffix(&mut self, suffix: SuffixPolicy) -> ApiResult<()> {
        self.enter(Operation::SetDiskFilenameSuffix)?;
        self.stream.suffix = suffix;
        Ok(())
    }

    fn set_stream_file_length(&mut self, ms: u32) -> ApiResult<()> {
        self.enter(Operation::SetDiskFileLength)?;
        if ms == 0 {
            return Err(ApiError::Status(StatusKind::PARAMETER));
        }
        self.stream.file_length_ms = ms;
        Ok(())
    }

    fn set_stream_file_mode(&mut self, mode: OutputMode) -> ApiResult<()> {
        self.enter(Operation::SetDiskFileMode)?;
        self.stream.mode = mode;
        Ok(())
    }

    fn set_stream_file_count(&mut self, count: u32) -> ApiResult<()> {
        self.enter(Operation::SetDiskFileCount)?;
        if count == 0 {
            return Err(ApiError::Status(StatusKind::PARAMETER));
        }
        self.stream.file_count = count;
        Ok(())
    }

    fn set_stream_enable(&mut self, enable: bool) -> ApiResult<()> {
        let op = if enable {
            Operation::EnableStream
        } else {
            Operation::DisableStream
        };
        self.enter(op)?;
        self.enabled_at = enable.then(|| (Instant::now(), Utc::now()));
        self.written = 0;
        Ok(())
    }

    fn stream_active(&mut self) -> ApiResult<bool> {
        self.enter(Operation::GetActiveStatus)?;
        if self.stuck_active {
            return Ok(true);
        }
        let Some((began, wall)) = self.enabled_at else {
            return Ok(false);
        };
        if !self.running {
            // Enabled but the acquisition hardware is idle, nothing progresses
            return Ok(true);
        }
        let per_file = self.segment_duration().as_secs_f64();
        let finished = if per_file > 0.0 {
            (began.elapsed().as_secs_f64() / per_file).floor() as u64
        } else {
            u64::MAX
        };
        let done = finished.min(self.stream.file_count as u64) as u32;
        self.write_segments(done, wall)?;
        Ok(done < self.stream.file_count)
    }

    fn error_string(&mut self, code: i32) -> Option<String> {
        let msg = match StatusKind::from_code(code) {
            StatusKind::NotConnected => "Not connected",
            StatusKind::Parameter => "Parameter error",
            StatusKind::Timeout => "Timeout",
            StatusKind::Transfer => "Transfer error",
            StatusKind::DataNotReady => "Data not ready",
            StatusKind::IncompatibleFirmware => "Incompatible firmware",
            StatusKind::LoLockFailure => "LO lock failure",
            StatusKind::ExternalReferenceNotEnabled => "External reference not enabled",
            StatusKind::Unknown => return None,
        };
        Some(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn streaming(dir: &Path, suffix: SuffixPolicy, mode: OutputMode) -> SimulatedDevice {
        let mut sim = SimulatedDevice::new(SimSettings {
            time_scale: 0.0,
            per_file_overhead: Duration::ZERO,
            ..Default::default()
        });
        sim.connect(0).unwrap();
        sim.set_stream_path(dir).unwrap();
        sim.set_stream_filename_base("cap").unwrap();
        sim.set_stream_suffix(suffix).unwrap();
        sim.set_stream_file_mode(mode).unwrap();
        sim.set_stream_file_length(10).unwrap();
        sim.set_stream_file_count(3).unwrap();
        sim
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_incrementing_names() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = streaming(tmp.path(), SuffixPolicy::IncrementingIndex, OutputMode::Formatted);
        sim.run().unwrap();
        sim.set_stream_enable(true).unwrap();
        assert!(!sim.stream_active().unwrap());
        assert_eq!(
            names(tmp.path()),
            ["cap-00000.r3f", "cap-00001.r3f", "cap-00002.r3f"]
        );
    }

    #[test]
    fn test_framed_timestamp_names() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = streaming(tmp.path(), SuffixPolicy::Timestamp, OutputMode::Framed);
        sim.run().unwrap();
        sim.set_stream_enable(true).unwrap();
        assert!(!sim.stream_active().unwrap());
        let names = names(tmp.path());
        assert_eq!(names.len(), 6);
        assert!(names.iter().all(|n| n.starts_with("cap-")));
        assert_eq!(names.iter().filter(|n| n.ends_with(".r3h")).count(), 3);
    }

    #[test]
    fn test_no_suffix_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = streaming(tmp.path(), SuffixPolicy::None, OutputMode::Formatted);
        sim.run().unwrap();
        sim.set_stream_enable(true).unwrap();
        assert!(!sim.stream_active().unwrap());
        assert_eq!(names(tmp.path()), ["cap.r3f"]);
    }

    #[test]
    fn test_paced_by_segment_length() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = SimulatedDevice::new(SimSettings {
            time_scale: 1.0,
            per_file_overhead: Duration::ZERO,
            ..Default::default()
        });
        sim.connect(0).unwrap();
        sim.set_stream_path(tmp.path()).unwrap();
        sim.set_stream_filename_base("cap").unwrap();
        sim.set_stream_file_length(20).unwrap();
        sim.set_stream_file_count(3).unwrap();
        sim.run().unwrap();
        sim.set_stream_enable(true).unwrap();
        assert!(sim.stream_active().unwrap());
        thread::sleep(Duration::from_millis(70));
        assert!(!sim.stream_active().unwrap());
    }

    #[test]
    fn test_enabled_without_run_never_finishes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = streaming(tmp.path(), SuffixPolicy::IncrementingIndex, OutputMode::Formatted);
        sim.set_stream_enable(true).unwrap();
        assert!(sim.stream_active().unwrap());
        assert!(names(tmp.path()).is_empty());
    }

    #[test]
    fn test_requires_connection() {
        let mut sim = SimulatedDevice::new(SimSettings::default());
        assert_eq!(sim.run(), Err(ApiError::Status(StatusKind::NOT_CONNECTED)));
        assert_eq!(sim.calls(), [Operation::Run]);
    }

    #[test]
    fn test_missing_directory_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = SimulatedDevice::new(SimSettings::default());
        sim.connect(0).unwrap();
        assert_eq!(
            sim.set_stream_path(&tmp.path().join("absent")),
            Err(ApiError::Status(StatusKind::PARAMETER))
        );
    }
}
