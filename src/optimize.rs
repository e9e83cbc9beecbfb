//! Sweep over segment durations to find the one the device streams fastest

use std::{fs::File, path::Path};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    acquire::{AcquisitionController, AcquisitionResult},
    device::{DeviceApi, DeviceSession},
    error::{Error, Result},
    relocate::FileRelocator,
    stream::StreamConfig,
};

/// One planned trial
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub duration_s: f64,
    pub segment_ms: u32,
    pub segment_count: u32,
}

/// One executed trial
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trial {
    pub candidate_s: f64,
    pub segment_ms: u32,
    pub segment_count: u32,
    pub elapsed_s: f64,
    #[serde(rename = "rate_ms_per_s")]
    pub rate: f64,
    pub timed_out: bool,
}

impl Trial {
    fn new(candidate: &Candidate, result: &AcquisitionResult) -> Self {
        Self {
            candidate_s: candidate.duration_s,
            segment_ms: result.segment_duration_ms,
            segment_count: result.segment_count,
            elapsed_s: result.elapsed.as_secs_f64(),
            rate: result.achieved_rate,
            timed_out: result.timed_out,
        }
    }
}

/// Trials in execution order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrialRecord {
    trials: Vec<Trial>,
}

impl TrialRecord {
    pub fn push(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Highest rate, earliest trial on ties
    pub fn best(&self) -> Option<&Trial> {
        self.trials.iter().fold(None, |best: Option<&Trial>, t| match best {
            Some(b) if b.rate >= t.rate => Some(b),
            _ => Some(t),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationReport {
    pub record: TrialRecord,
    pub optimum: Trial,
}

impl OptimizationReport {
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::fs("creating report", path, e))?;
        let mut wtr = csv::Writer::from_writer(file);
        for trial in self.record.trials() {
            wtr.serialize(trial)?;
        }
        wtr.flush()
            .map_err(|e| Error::fs("writing report", path, e))?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct CadenceOptimizer {
    total_s: f64,
    trials: usize,
    step_s: f64,
}

impl CadenceOptimizer {
    /// Sweep `trials` durations from `step_s` to `trials * step_s` seconds,
    /// each covering `total_s` of capture
    pub fn new(total_s: f64, trials: usize, step_s: f64) -> Result<Self> {
        if trials < 2 {
            return Err(Error::InvalidParameter(format!(
                "need at least 2 trials to space candidates, got {trials}"
            )));
        }
        if !(total_s > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "total duration must be positive, got {total_s}"
            )));
        }
        if !(step_s > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "step must be positive, got {step_s}"
            )));
        }
        Ok(Self {
            total_s,
            trials,
            step_s,
        })
    }

    /// Linearly spaced segment durations in seconds
    pub fn durations(&self) -> Vec<f64> {
        let max_s = self.trials as f64 * self.step_s;
        let last = (self.trials - 1) as f64;
        (0..self.trials)
            .map(|i| self.step_s + (max_s - self.step_s) * i as f64 / last)
            .collect()
    }

    pub fn segment_count(&self, duration_s: f64) -> u32 {
        ((self.total_s / duration_s).round() as u32).max(1)
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.durations()
            .into_iter()
            .map(|duration_s| Candidate {
                duration_s,
                segment_ms: ((duration_s * 1000.0).round() as u32).max(1),
                segment_count: self.segment_count(duration_s),
            })
            .collect()
    }

    /// Run every candidate through `controller`, streaming into the template's
    /// output directory, and pick the fastest.
    ///
    /// Device and configuration faults end the sweep. A trial whose drain
    /// times out is kept, flagged, with its degraded rate.
    pub fn sweep<D: DeviceApi>(
        &self,
        session: &mut DeviceSession<D>,
        controller: &mut AcquisitionController,
        template: &StreamConfig,
    ) -> Result<OptimizationReport> {
        let mut record = TrialRecord::default();
        for candidate in self.candidates() {
            info!(
                "--- Benchmarking file length = {:.3}s ({} files) ---",
                candidate.duration_s, candidate.segment_count
            );
            let stale = FileRelocator::purge(&template.output_dir)?;
            if stale > 0 {
                info!("Cleared {stale} stale files");
            }
            let config = StreamConfig {
                segment_duration_ms: candidate.segment_ms,
                retained_segment_count: candidate.segment_count,
                ..template.clone()
            };
            controller.configure(session, config)?;
            let result = match controller.run(session) {
                Ok(result) => result,
                Err(Error::DrainTimeout(result)) => {
                    warn!("Trial {:.3}s timed out, keeping degraded result", candidate.duration_s);
                    result
                }
                Err(e) => return Err(e),
            };
            let trial = Trial::new(&candidate, &result);
            info!(
                "[{:.3} s] -> {:.2} ms/s (acquisition time {:.2}s)",
                trial.candidate_s, trial.rate, trial.elapsed_s
            );
            record.push(trial);
        }
        let optimum = record
            .best()
            .cloned()
            .ok_or_else(|| Error::InvalidParameter("sweep produced no trials".to_owned()))?;
        info!(
            "Optimal file length: {:.3} s -> {:.2} ms/s",
            optimum.candidate_s, optimum.rate
        );
        if optimum.timed_out {
            warn!("Optimal trial hit the drain timeout, its rate overstates the device");
        }
        Ok(OptimizationReport { record, optimum })
    }
}
