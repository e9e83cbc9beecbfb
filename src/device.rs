//! Ownership of the capture device.
//!
//! [`DeviceApi`] is the vendor surface, one method per call, implemented by the
//! simulator and (with the `rsa-api` feature) by the FFI binding. A
//! [`DeviceSession`] owns exactly one of those and is the only way the rest of
//! the crate reaches the hardware.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, ApiResult, DeviceStatus, Error, Operation, Result},
    stream::{OutputMode, SuffixPolicy},
};

/// An instrument reported by a device search
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: i32,
    pub serial: String,
    pub device_type: String,
}

/// The blocking call surface of a spectrum analyzer
pub trait DeviceApi {
    fn api_version(&mut self) -> ApiResult<String>;
    fn search(&mut self) -> ApiResult<Vec<DeviceInfo>>;
    fn connect(&mut self, id: i32) -> ApiResult<()>;
    fn serial_number(&mut self) -> ApiResult<String>;
    fn disconnect(&mut self) -> ApiResult<()>;

    fn preset(&mut self) -> ApiResult<()>;
    fn set_center_frequency(&mut self, hz: f64) -> ApiResult<()>;
    fn set_reference_level(&mut self, dbm: f64) -> ApiResult<()>;
    fn run(&mut self) -> ApiResult<()>;
    fn stop(&mut self) -> ApiResult<()>;

    fn set_stream_path(&mut self, path: &Path) -> ApiResult<()>;
    fn set_stream_filename_base(&mut self, base: &str) -> ApiResult<()>;
    fn set_stream_suffix(&mut self, suffix: SuffixPolicy) -> ApiResult<()>;
    fn set_stream_file_length(&mut self, ms: u32) -> ApiResult<()>;
    fn set_stream_file_mode(&mut self, mode: OutputMode) -> ApiResult<()>;
    fn set_stream_file_count(&mut self, count: u32) -> ApiResult<()>;
    fn set_stream_enable(&mut self, enable: bool) -> ApiResult<()>;
    fn stream_active(&mut self) -> ApiResult<bool>;

    /// Human readable description of a status code, if the device has one
    fn error_string(&mut self, code: i32) -> Option<String>;
}

/// The instrument a session is connected to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: i32,
    pub serial: String,
    pub device_type: String,
}

pub struct DeviceSession<D: DeviceApi> {
    api: D,
    handle: Option<DeviceHandle>,
    running: bool,
}

impl<D: DeviceApi> DeviceSession<D> {
    pub fn new(api: D) -> Self {
        Self {
            api,
            handle: None,
            running: false,
        }
    }

    pub fn api(&self) -> &D {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut D {
        &mut self.api
    }

    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Perform one device call, lifting a failure into a typed [`Error`]
    pub fn call<T>(&mut self, op: Operation, f: impl FnOnce(&mut D) -> ApiResult<T>) -> Result<T> {
        debug!(%op, "device call");
        match f(&mut self.api) {
            Ok(v) => Ok(v),
            Err(ApiError::Unsupported) => Err(Error::NotSupported { op }),
            Err(ApiError::Status(code)) => {
                let status = DeviceStatus {
                    code,
                    message: self.api.error_string(code),
                };
                Err(Error::from_status(op, status))
            }
        }
    }

    /// Find and connect to an instrument, the one with `serial` if given
    pub fn connect(&mut self, serial: Option<&str>) -> Result<&DeviceHandle> {
        if self.handle.is_none() {
            let handle = self.open(serial)?;
            self.handle = Some(handle);
        }
        self.handle.as_ref().ok_or(Error::NotFound)
    }

    fn open(&mut self, serial: Option<&str>) -> Result<DeviceHandle> {
        let version = self.call(Operation::GetApiVersion, |d| d.api_version())?;
        info!("API version: {version}");
        info!("Searching for devices...");
        let devices = self.call(Operation::Search, |d| d.search())?;
        info!("Found {} device(s)", devices.len());
        for dev in &devices {
            info!(
                id = dev.id,
                serial = %dev.serial,
                device_type = %dev.device_type,
                "Device"
            );
        }
        let chosen = match serial {
            Some(s) => devices.into_iter().find(|d| d.serial == s),
            None => devices.into_iter().next(),
        }
        .ok_or(Error::NotFound)?;
        self.call(Operation::Connect, |d| d.connect(chosen.id))?;
        let serial = match self.call(Operation::GetSerialNumber, |d| d.serial_number()) {
            Ok(serial) => serial,
            Err(e) => {
                // No handle is stored yet, so release the connection here
                if let Err(err) = self.call(Operation::Disconnect, |d| d.disconnect()) {
                    warn!("Disconnect after failed connect: {err}");
                }
                return Err(e);
            }
        };
        info!(
            id = chosen.id,
            serial = %serial,
            device_type = %chosen.device_type,
            "Connected"
        );
        Ok(DeviceHandle {
            id: chosen.id,
            serial,
            device_type: chosen.device_type,
        })
    }

    pub fn preset(&mut self) -> Result<()> {
        self.call(Operation::Preset, |d| d.preset())
    }

    pub fn set_center_frequency(&mut self, hz: f64) -> Result<()> {
        info!("Setting center frequency: {hz} Hz");
        self.call(Operation::SetCenterFreq, |d| d.set_center_frequency(hz))
    }

    pub fn set_reference_level(&mut self, dbm: f64) -> Result<()> {
        info!("Setting reference level: {dbm} dBm");
        self.call(Operation::SetReferenceLevel, |d| d.set_reference_level(dbm))
    }

    pub fn run(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::DeviceBusy { op: Operation::Run });
        }
        self.call(Operation::Run, |d| d.run())?;
        self.running = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.call(Operation::Stop, |d| d.stop())?;
        self.running = false;
        Ok(())
    }

    /// Release the instrument. Does nothing if not connected.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if self.running {
            if let Err(e) = self.stop() {
                warn!("Stopping before disconnect: {e}");
            }
        }
        self.call(Operation::Disconnect, |d| d.disconnect())?;
        info!(serial = %handle.serial, "Device disconnected");
        Ok(())
    }
}

impl<D: DeviceApi> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Disconnect on drop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StatusKind,
        sim::{SimSettings, SimulatedDevice},
    };

    fn session() -> DeviceSession<SimulatedDevice> {
        DeviceSession::new(SimulatedDevice::new(SimSettings::default()))
    }

    #[test]
    fn test_connect_first_device() {
        let mut s = session();
        let handle = s.connect(None).unwrap().clone();
        assert_eq!(handle.serial, "B010101");
        assert!(s.api().is_connected());
    }

    #[test]
    fn test_connect_by_serial() {
        let mut s = DeviceSession::new(SimulatedDevice::new(SimSettings {
            devices: vec![("RSA306B", "A1"), ("RSA507A", "B2")],
            ..Default::default()
        }));
        assert_eq!(s.connect(Some("B2")).unwrap().device_type, "RSA507A");
        let mut s = DeviceSession::new(SimulatedDevice::new(SimSettings {
            devices: vec![("RSA306B", "A1")],
            ..Default::default()
        }));
        assert!(matches!(s.connect(Some("nope")), Err(Error::NotFound)));
    }

    #[test]
    fn test_no_devices() {
        let mut s = DeviceSession::new(SimulatedDevice::new(SimSettings {
            devices: vec![],
            ..Default::default()
        }));
        assert!(matches!(s.connect(None), Err(Error::NotFound)));
        assert!(s.handle().is_none());
    }

    #[test]
    fn test_connect_failure_carries_message() {
        let mut sim = SimulatedDevice::new(SimSettings::default());
        sim.fail(Operation::Connect, StatusKind::TRANSFER);
        let mut s = DeviceSession::new(sim);
        let err = s.connect(None).unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
        assert!(err.to_string().contains("DEVICE_Connect"));
        assert!(err.to_string().contains("Transfer error"));
    }

    #[test]
    fn test_serial_failure_releases_connection() {
        let mut sim = SimulatedDevice::new(SimSettings::default());
        sim.fail(Operation::GetSerialNumber, StatusKind::TIMEOUT);
        let mut s = DeviceSession::new(sim);
        assert!(matches!(s.connect(None), Err(Error::Timeout { .. })));
        assert!(s.handle().is_none());
        assert!(!s.api().is_connected());
        s.disconnect().unwrap();
        let disconnects = |s: &DeviceSession<SimulatedDevice>| {
            s.api()
                .calls()
                .iter()
                .filter(|op| **op == Operation::Disconnect)
                .count()
        };
        assert_eq!(disconnects(&s), 1);

        s.api_mut().clear_failures();
        assert_eq!(s.connect(None).unwrap().serial, "B010101");
        s.disconnect().unwrap();
        assert_eq!(disconnects(&s), 2);
    }

    #[test]
    fn test_run_twice_is_busy() {
        let mut s = session();
        s.connect(None).unwrap();
        s.run().unwrap();
        assert!(matches!(s.run(), Err(Error::DeviceBusy { .. })));
        s.stop().unwrap();
        s.run().unwrap();
    }

    #[test]
    fn test_disconnect_idempotent() {
        let mut s = session();
        s.connect(None).unwrap();
        s.run().unwrap();
        s.disconnect().unwrap();
        s.disconnect().unwrap();
        assert!(!s.is_running());
        let disconnects = s
            .api()
            .calls()
            .iter()
            .filter(|op| **op == Operation::Disconnect)
            .count();
        assert_eq!(disconnects, 1);
        assert!(s.api().calls().contains(&Operation::Stop));
    }

    #[test]
    fn test_tuning_calls_reach_device() {
        let mut s = session();
        s.connect(None).unwrap();
        s.preset().unwrap();
        s.set_center_frequency(1420e6).unwrap();
        s.set_reference_level(-10.0).unwrap();
        assert_eq!(s.api().center_frequency(), 1420e6);
        assert_eq!(s.api().reference_level(), -10.0);
    }
}
