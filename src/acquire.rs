//! A single bounded acquisition.
//!
//! The controller walks `Idle -> Configured -> Running -> Draining -> Idle`.
//! Once streaming has been enabled the device is always disabled and stopped
//! again, however the drain ends.

use std::{
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    device::{DeviceApi, DeviceSession},
    error::{Error, Operation, Result},
    stream::{StreamConfig, StreamConfigurator},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Configured,
    Running,
    Draining,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionResult {
    /// Wall time from enabling the stream to seeing it inactive (or giving up)
    pub elapsed: Duration,
    pub segment_duration_ms: u32,
    pub segment_count: u32,
    /// Milliseconds of scheduled capture per second of wall time
    pub achieved_rate: f64,
    pub timed_out: bool,
}

impl AcquisitionResult {
    fn new(config: &StreamConfig, elapsed: Duration, timed_out: bool) -> Self {
        let secs = elapsed.as_secs_f64();
        let achieved_rate = if secs > 0.0 {
            config.scheduled_ms() as f64 / secs
        } else {
            0.0
        };
        Self {
            elapsed,
            segment_duration_ms: config.segment_duration_ms,
            segment_count: config.retained_segment_count,
            achieved_rate,
            timed_out,
        }
    }
}

enum Drain {
    Completed,
    TimedOut,
    Faulted(Error),
}

pub struct AcquisitionController {
    poll_interval: Duration,
    drain_timeout: Duration,
    state: State,
    config: Option<StreamConfig>,
}

impl AcquisitionController {
    pub fn new(poll_interval: Duration, drain_timeout: Duration) -> Self {
        Self {
            poll_interval,
            drain_timeout,
            state: State::Idle,
            config: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Push `config` to the device. On failure the controller stays idle.
    pub fn configure<D: DeviceApi>(
        &mut self,
        session: &mut DeviceSession<D>,
        config: StreamConfig,
    ) -> Result<()> {
        self.state = State::Idle;
        self.config = None;
        StreamConfigurator::apply(session, &config)?;
        self.config = Some(config);
        self.state = State::Configured;
        Ok(())
    }

    /// Run one acquisition with the configuration from [`Self::configure`].
    ///
    /// A drain that outlives the safety timeout comes back as
    /// [`Error::DrainTimeout`] holding the degraded measurement.
    pub fn run<D: DeviceApi>(&mut self, session: &mut DeviceSession<D>) -> Result<AcquisitionResult> {
        let config = match (self.state, self.config.take()) {
            (State::Configured, Some(config)) => config,
            _ => {
                self.state = State::Idle;
                return Err(Error::NotConfigured);
            }
        };
        self.state = State::Idle;

        info!("Starting acquisition...");
        session.run()?;
        self.state = State::Running;
        if let Err(e) = session.call(Operation::EnableStream, |d| d.set_stream_enable(true)) {
            if let Err(stop) = session.stop() {
                warn!("Stop after failed enable: {stop}");
            }
            self.state = State::Idle;
            return Err(e);
        }
        let started = Instant::now();
        info!("IF streaming enabled");

        self.state = State::Draining;
        let drain = self.drain(session, started);
        let elapsed = started.elapsed();

        let cleanup = self.shutdown(session);
        self.state = State::Idle;

        match drain {
            Drain::Faulted(e) => {
                if let Err(c) = cleanup {
                    warn!("Cleanup after fault: {c}");
                }
                Err(e)
            }
            Drain::Completed => {
                cleanup?;
                let result = AcquisitionResult::new(&config, elapsed, false);
                info!(
                    elapsed_s = result.elapsed.as_secs_f64(),
                    rate = result.achieved_rate,
                    "Streaming finished"
                );
                Ok(result)
            }
            Drain::TimedOut => {
                cleanup?;
                let result = AcquisitionResult::new(&config, elapsed, true);
                warn!(
                    "Timeout after {:.3} s, stream forcibly stopped",
                    result.elapsed.as_secs_f64()
                );
                Err(Error::DrainTimeout(result))
            }
        }
    }

    fn drain<D: DeviceApi>(&self, session: &mut DeviceSession<D>, started: Instant) -> Drain {
        // A timeout past the end of the clock means wait forever
        let deadline = started.checked_add(self.drain_timeout);
        loop {
            let now = Instant::now();
            let nap = match deadline {
                Some(deadline) if now >= deadline => return Drain::TimedOut,
                Some(deadline) => self.poll_interval.min(deadline - now),
                None => self.poll_interval,
            };
            thread::sleep(nap);
            match session.call(Operation::GetActiveStatus, |d| d.stream_active()) {
                Ok(true) => debug!(
                    elapsed_s = started.elapsed().as_secs_f64(),
                    "IF streaming active"
                ),
                Ok(false) => return Drain::Completed,
                Err(e) => return Drain::Faulted(e),
            }
        }
    }

    /// Disable streaming then stop the device, attempting both
    fn shutdown<D: DeviceApi>(&self, session: &mut DeviceSession<D>) -> Result<()> {
        let disable = session.call(Operation::DisableStream, |d| d.set_stream_enable(false));
        let stop = session.stop();
        if disable.is_ok() && stop.is_ok() {
            info!("Acquisition stopped");
        }
        disable.and(stop)
    }
}
