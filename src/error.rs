//! Error types for device control, streaming and file handling.
//!
//! The device collaborator speaks in raw status codes ([`ApiError`]). The
//! session lifts those into [`Error`], attaching the vendor operation name and
//! whatever message the device has for the code, so failures can be matched
//! against the vendor documentation.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::acquire::AcquisitionResult;

pub type Result<T> = std::result::Result<T, Error>;

/// Every call we make into the device, named after the vendor entry point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetApiVersion,
    Search,
    Connect,
    GetSerialNumber,
    Disconnect,
    Preset,
    SetCenterFreq,
    SetReferenceLevel,
    Run,
    Stop,
    SetDiskFilePath,
    SetDiskFilenameBase,
    SetDiskFilenameSuffix,
    SetDiskFileLength,
    SetDiskFileMode,
    SetDiskFileCount,
    EnableStream,
    DisableStream,
    GetActiveStatus,
}

impl Operation {
    pub fn vendor_name(self) -> &'static str {
        match self {
            Operation::GetApiVersion => "DEVICE_GetAPIVersion",
            Operation::Search => "DEVICE_Search",
            Operation::Connect => "DEVICE_Connect",
            Operation::GetSerialNumber => "DEVICE_GetSerialNumber",
            Operation::Disconnect => "DEVICE_Disconnect",
            Operation::Preset => "CONFIG_Preset",
            Operation::SetCenterFreq => "CONFIG_SetCenterFreq",
            Operation::SetReferenceLevel => "CONFIG_SetReferenceLevel",
            Operation::Run => "DEVICE_Run",
            Operation::Stop => "DEVICE_Stop",
            Operation::SetDiskFilePath => "IFSTREAM_SetDiskFilePath",
            Operation::SetDiskFilenameBase => "IFSTREAM_SetDiskFilenameBase",
            Operation::SetDiskFilenameSuffix => "IFSTREAM_SetDiskFilenameSuffix",
            Operation::SetDiskFileLength => "IFSTREAM_SetDiskFileLength",
            Operation::SetDiskFileMode => "IFSTREAM_SetDiskFileMode",
            Operation::SetDiskFileCount => "IFSTREAM_SetDiskFileCount",
            Operation::EnableStream | Operation::DisableStream => "IFSTREAM_SetEnable",
            Operation::GetActiveStatus => "IFSTREAM_GetActiveStatus",
        }
    }

    /// Operations that belong to establishing the connection itself
    fn is_connection(self) -> bool {
        matches!(
            self,
            Operation::GetApiVersion
                | Operation::Search
                | Operation::Connect
                | Operation::GetSerialNumber
                | Operation::Disconnect
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::EnableStream => write!(f, "{}(true)", self.vendor_name()),
            Operation::DisableStream => write!(f, "{}(false)", self.vendor_name()),
            _ => f.write_str(self.vendor_name()),
        }
    }
}

/// Raw failure from a device backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiError {
    /// Non-zero return status
    Status(i32),
    /// The backend has no implementation for this call
    Unsupported,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Turn a raw vendor return code into an [`ApiResult`]
pub fn check(code: i32) -> ApiResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(ApiError::Status(code))
    }
}

/// Named vendor status codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    NotConnected,
    Parameter,
    Timeout,
    Transfer,
    DataNotReady,
    IncompatibleFirmware,
    LoLockFailure,
    ExternalReferenceNotEnabled,
    Unknown,
}

impl StatusKind {
    pub const NOT_CONNECTED: i32 = -1;
    pub const PARAMETER: i32 = -2;
    pub const TIMEOUT: i32 = -3;
    pub const TRANSFER: i32 = -4;

    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => StatusKind::NotConnected,
            -2 => StatusKind::Parameter,
            -3 => StatusKind::Timeout,
            -4 => StatusKind::Transfer,
            -5 => StatusKind::DataNotReady,
            -6 => StatusKind::IncompatibleFirmware,
            -7 => StatusKind::LoLockFailure,
            -8 => StatusKind::ExternalReferenceNotEnabled,
            _ => StatusKind::Unknown,
        }
    }

    fn label(self) -> &'static str {
        match self {
            StatusKind::NotConnected => "errorNotConnected",
            StatusKind::Parameter => "errorParameter",
            StatusKind::Timeout => "errorTimeout",
            StatusKind::Transfer => "errorTransfer",
            StatusKind::DataNotReady => "errorDataNotReady",
            StatusKind::IncompatibleFirmware => "errorIncompatibleFirmware",
            StatusKind::LoLockFailure => "errorLOLockFailure",
            StatusKind::ExternalReferenceNotEnabled => "errorExternalReferenceNotEnabled",
            StatusKind::Unknown => "unknown status",
        }
    }
}

/// A failed status code together with the device's own description of it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceStatus {
    pub code: i32,
    pub message: Option<String>,
}

impl DeviceStatus {
    pub fn kind(&self) -> StatusKind {
        StatusKind::from_code(self.code)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {} ({})", self.code, self.kind().label())?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no capture device found")]
    NotFound,

    #[error("{op} failed: {status}")]
    Connection { op: Operation, status: DeviceStatus },

    #[error("{op} rejected: {status}")]
    Configuration { op: Operation, status: DeviceStatus },

    #[error("{op} transfer fault: {status}")]
    Transfer { op: Operation, status: DeviceStatus },

    #[error("{op} timed out: {status}")]
    Timeout { op: Operation, status: DeviceStatus },

    #[error("{op} is not supported by this device backend")]
    NotSupported { op: Operation },

    #[error("{op} called while the device is already running")]
    DeviceBusy { op: Operation },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("acquisition started without a complete stream configuration")]
    NotConfigured,

    #[error("stream still active after {:.3}s, forced stop", .0.elapsed.as_secs_f64())]
    DrainTimeout(AcquisitionResult),

    #[error("{context} ({}): {source}", .path.display())]
    Filesystem {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings file: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("failed to write report: {0}")]
    Report(#[from] csv::Error),
}

impl Error {
    /// Classify a non-zero device status raised by `op`
    pub fn from_status(op: Operation, status: DeviceStatus) -> Self {
        match status.kind() {
            StatusKind::NotConnected => Error::Connection { op, status },
            StatusKind::Transfer => Error::Transfer { op, status },
            StatusKind::Timeout => Error::Timeout { op, status },
            _ if op.is_connection() => Error::Connection { op, status },
            _ => Error::Configuration { op, status },
        }
    }

    pub fn fs(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            context,
            path: path.into(),
            source,
        }
    }
}
