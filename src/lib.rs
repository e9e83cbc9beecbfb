//! Segmented IF capture from a real-time spectrum analyzer.
//!
//! A [`DeviceSession`] owns the instrument, a [`StreamConfigurator`] pushes
//! the file segmentation to it, an [`AcquisitionController`] runs one bounded
//! capture and measures it, and a [`FileRelocator`] drains the finished
//! segments off the RAM disk. [`CadenceOptimizer`] repeats captures over a
//! range of segment lengths to find the one the device sustains best.

pub mod acquire;
pub mod args;
pub mod config;
pub mod device;
pub mod error;
pub mod optimize;
pub mod relocate;
#[cfg(feature = "rsa-api")]
pub mod rsa;
pub mod sim;
pub mod stream;

pub use acquire::{AcquisitionController, AcquisitionResult};
pub use device::{DeviceApi, DeviceHandle, DeviceSession};
pub use error::{Error, Result};
pub use optimize::{CadenceOptimizer, OptimizationReport, TrialRecord};
pub use relocate::FileRelocator;
pub use stream::{StreamConfig, StreamConfigurator};
