//! Tektronix RSA API backend.
//!
//! Binds the C entry points of `libRSA_API.so` (which pulls in
//! `libcyusb_shared.so` itself). Only built with the `rsa-api` feature, so the
//! rest of the crate and its tests never need the vendor library.

use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_int, c_long},
    path::Path,
};

use crate::{
    device::{DeviceApi, DeviceInfo},
    error::{check, ApiError, ApiResult, StatusKind},
    stream::{OutputMode, SuffixPolicy},
};

const DEVSRCH_MAX_NUM_DEVICES: usize = 20;
const DEVSRCH_SERIAL_MAX_STRLEN: usize = 100;
const DEVSRCH_TYPE_MAX_STRLEN: usize = 20;
const DEVINFO_MAX_STRLEN: usize = 100;

#[link(name = "RSA_API")]
extern "C" {
    fn DEVICE_GetAPIVersion(version: *mut c_char) -> c_int;
    fn DEVICE_Search(
        num_devices: *mut c_int,
        device_ids: *mut c_int,
        device_serials: *mut [c_char; DEVSRCH_SERIAL_MAX_STRLEN],
        device_types: *mut [c_char; DEVSRCH_TYPE_MAX_STRLEN],
    ) -> c_int;
    fn DEVICE_Connect(device_id: c_int) -> c_int;
    fn DEVICE_Disconnect() -> c_int;
    fn DEVICE_GetSerialNumber(serial: *mut c_char) -> c_int;
    fn DEVICE_Run() -> c_int;
    fn DEVICE_Stop() -> c_int;
    fn DEVICE_GetErrorString(status: c_int) -> *const c_char;

    fn CONFIG_Preset() -> c_int;
    fn CONFIG_SetCenterFreq(cf: f64) -> c_int;
    fn CONFIG_SetReferenceLevel(ref_level: f64) -> c_int;

    fn IFSTREAM_SetDiskFilePath(path: *const c_char) -> c_int;
    fn IFSTREAM_SetDiskFilenameBase(base: *const c_char) -> c_int;
    fn IFSTREAM_SetDiskFilenameSuffix(suffix_ctl: c_int) -> c_int;
    fn IFSTREAM_SetDiskFileLength(file_length: c_long) -> c_int;
    fn IFSTREAM_SetDiskFileMode(mode: c_int) -> c_int;
    fn IFSTREAM_SetDiskFileCount(file_count: c_int) -> c_int;
    fn IFSTREAM_SetEnable(enable: bool) -> c_int;
    fn IFSTREAM_GetActiveStatus(is_active: *mut bool) -> c_int;
}

/// Read a NUL terminated (or full) C char buffer
fn from_c_buf(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn to_c_string(s: &str) -> ApiResult<CString> {
    CString::new(s).map_err(|_| ApiError::Status(StatusKind::PARAMETER))
}

/// The process-wide vendor library. The API holds one connection at a time,
/// so there should only ever be one of these.
#[derive(Debug, Default)]
pub struct RsaDevice {
    _private: (),
}

impl RsaDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceApi for RsaDevice {
    fn api_version(&mut self) -> ApiResult<String> {
        let mut buf = [0 as c_char; DEVINFO_MAX_STRLEN];
        // Safety: the buffer is the size the API documents for version strings
        check(unsafe { DEVICE_GetAPIVersion(buf.as_mut_ptr()) })?;
        Ok(from_c_buf(&buf))
    }

    fn search(&mut self) -> ApiResult<Vec<DeviceInfo>> {
        let mut num: c_int = 0;
        let mut ids = [0 as c_int; DEVSRCH_MAX_NUM_DEVICES];
        let mut serials = [[0 as c_char; DEVSRCH_SERIAL_MAX_STRLEN]; DEVSRCH_MAX_NUM_DEVICES];
        let mut types = [[0 as c_char; DEVSRCH_TYPE_MAX_STRLEN]; DEVSRCH_MAX_NUM_DEVICES];
        // Safety: all arrays hold DEVSRCH_MAX_NUM_DEVICES entries of the documented widths
        check(unsafe {
            DEVICE_Search(
                &mut num,
                ids.as_mut_ptr(),
                serials.as_mut_ptr(),
                types.as_mut_ptr(),
            )
        })?;
        let found = (num.max(0) as usize).min(DEVSRCH_MAX_NUM_DEVICES);
        Ok((0..found)
            .map(|i| DeviceInfo {
                id: ids[i],
                serial: from_c_buf(&serials[i]),
                device_type: from_c_buf(&types[i]),
            })
            .collect())
    }

    fn connect(&mut self, id: i32) -> ApiResult<()> {
        check(unsafe { DEVICE_Connect(id) })
    }

    fn serial_number(&mut self) -> ApiResult<String> {
        let mut buf = [0 as c_char; DEVINFO_MAX_STRLEN];
        // Safety: the buffer is the size the API documents for serial numbers
        check(unsafe { DEVICE_GetSerialNumber(buf.as_mut_ptr()) })?;
        Ok(from_c_buf(&buf))
    }

    fn disconnect(&mut self) -> ApiResult<()> {
        check(unsafe { DEVICE_Disconnect() })
    }

    fn preset(&mut self) -> ApiResult<()> {
        check(unsafe { CONFIG_Preset() })
    }

    fn set_center_frequency(&mut self, hz: f64) -> ApiResult<()> {
        check(unsafe { CONFIG_SetCenterFreq(hz) })
    }

    fn set_reference_level(&mut self, dbm: f64) -> ApiResult<()> {
        check(unsafe { CONFIG_SetReferenceLevel(dbm) })
    }

    fn run(&mut self) -> ApiResult<()> {
        check(unsafe { DEVICE_Run() })
    }

    fn stop(&mut self) -> ApiResult<()> {
        check(unsafe { DEVICE_Stop() })
    }

    fn set_stream_path(&mut self, path: &Path) -> ApiResult<()> {
        let path = path
            .to_str()
            .ok_or(ApiError::Status(StatusKind::PARAMETER))?;
        let path = to_c_string(path)?;
        // Safety: the API copies the string before returning
        check(unsafe { IFSTREAM_SetDiskFilePath(path.as_ptr()) })
    }

    fn set_stream_filename_base(&mut self, base: &str) -> ApiResult<()> {
        let base = to_c_string(base)?;
        check(unsafe { IFSTREAM_SetDiskFilenameBase(base.as_ptr()) })
    }

    fn set_stream_suffix(&mut self, suffix: SuffixPolicy) -> ApiResult<()> {
        check(unsafe { IFSTREAM_SetDiskFilenameSuffix(suffix.code()) })
    }

    fn set_stream_file_length(&mut self, ms: u32) -> ApiResult<()> {
        let ms = c_long::try_from(ms).map_err(|_| ApiError::Status(StatusKind::PARAMETER))?;
        check(unsafe { IFSTREAM_SetDiskFileLength(ms) })
    }

    fn set_stream_file_mode(&mut self, mode: OutputMode) -> ApiResult<()> {
        check(unsafe { IFSTREAM_SetDiskFileMode(mode.code()) })
    }

    fn set_stream_file_count(&mut self, count: u32) -> ApiResult<()> {
        let count = c_int::try_from(count).map_err(|_| ApiError::Status(StatusKind::PARAMETER))?;
        check(unsafe { IFSTREAM_SetDiskFileCount(count) })
    }

    fn set_stream_enable(&mut self, enable: bool) -> ApiResult<()> {
        check(unsafe { IFSTREAM_SetEnable(enable) })
    }

    fn stream_active(&mut self) -> ApiResult<bool> {
        let mut active = false;
        check(unsafe { IFSTREAM_GetActiveStatus(&mut active) })?;
        Ok(active)
    }

    fn error_string(&mut self, code: i32) -> Option<String> {
        // Safety: the API returns a pointer to a static string or null
        unsafe {
            let msg = DEVICE_GetErrorString(code);
            if msg.is_null() {
                None
            } else {
                Some(CStr::from_ptr(msg).to_string_lossy().into_owned())
            }
        }
    }
}
