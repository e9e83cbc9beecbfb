//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// TOML settings file (every value has a default)
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Drive the built-in simulated analyzer instead of hardware
    #[clap(long)]
    pub simulate: bool,
    /// Serial number of the analyzer to use (default: first found)
    #[clap(long)]
    pub serial: Option<String>,
    /// Center frequency in Hz
    #[clap(long)]
    pub center_frequency: Option<f64>,
    /// Reference level in dBm
    #[clap(long, allow_hyphen_values = true)]
    pub reference_level: Option<f64>,
    /// Give up on a stream that is still active after this many seconds
    #[clap(long)]
    pub drain_timeout: Option<f64>,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record one bounded IF capture and move it to durable storage
    Stream {
        /// Fast directory the device writes into
        #[clap(long)]
        temp_dir: Option<PathBuf>,
        /// Directory finished files are moved to
        #[clap(long)]
        dest_dir: Option<PathBuf>,
        /// Length of each file in milliseconds
        #[clap(long)]
        #[clap(value_parser = clap::value_parser!(u32).range(1..))]
        segment_ms: Option<u32>,
        /// Total capture length in seconds
        #[clap(long)]
        record_seconds: Option<f64>,
    },
    /// Sweep file lengths to find the fastest sustained streaming cadence
    Optimize {
        /// Working directory for trial files (cleared before each trial)
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Capture length each trial covers, in seconds
        #[clap(long)]
        total_seconds: Option<f64>,
        /// Number of file lengths to try (at least 2)
        #[clap(long)]
        trials: Option<usize>,
        /// Shortest file length in seconds, also the spacing between candidates
        #[clap(long)]
        step_seconds: Option<f64>,
        /// Write the trial table as CSV to this file
        #[clap(long)]
        report: Option<PathBuf>,
        /// Write the trial table as a timestamped CSV into this directory
        #[clap(long, conflicts_with = "report")]
        report_dir: Option<PathBuf>,
    },
}

impl Args {
    /// Fold command line overrides into `settings`
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(serial) = &self.serial {
            settings.device.serial = Some(serial.clone());
        }
        if let Some(hz) = self.center_frequency {
            settings.device.center_frequency_hz = hz;
        }
        if let Some(dbm) = self.reference_level {
            settings.device.reference_level_dbm = dbm;
        }
        if let Some(secs) = self.drain_timeout {
            settings.acquisition.drain_timeout_s = secs;
        }
        match &self.command {
            Command::Stream {
                temp_dir,
                dest_dir,
                segment_ms,
                record_seconds,
            } => {
                let stream = &mut settings.stream;
                if let Some(dir) = temp_dir {
                    stream.temp_dir = dir.clone();
                }
                if let Some(dir) = dest_dir {
                    stream.dest_dir = dir.clone();
                }
                if let Some(ms) = segment_ms {
                    stream.segment_ms = *ms;
                }
                if let Some(secs) = record_seconds {
                    stream.record_seconds = *secs;
                }
            }
            Command::Optimize {
                output_dir,
                total_seconds,
                trials,
                step_seconds,
                ..
            } => {
                let opt = &mut settings.optimizer;
                if let Some(dir) = output_dir {
                    opt.output_dir = dir.clone();
                }
                if let Some(secs) = total_seconds {
                    opt.total_seconds = *secs;
                }
                if let Some(n) = trials {
                    opt.trials = *n;
                }
                if let Some(secs) = step_seconds {
                    opt.step_seconds = *secs;
                }
            }
        }
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_overrides() {
        let args = Args::parse_from([
            "if_slurper",
            "--simulate",
            "--center-frequency",
            "100e6",
            "--reference-level",
            "-10",
            "stream",
            "--segment-ms",
            "250",
            "--dest-dir",
            "/data/if",
        ]);
        assert!(args.simulate);
        let mut settings = Settings::default();
        args.apply(&mut settings);
        assert_eq!(settings.device.center_frequency_hz, 100e6);
        assert_eq!(settings.device.reference_level_dbm, -10.0);
        assert_eq!(settings.stream.segment_ms, 250);
        assert_eq!(settings.stream.dest_dir, PathBuf::from("/data/if"));
        assert_eq!(settings.stream.filename_base, "if_capture");
    }

    #[test]
    fn test_optimize_overrides() {
        let args = Args::parse_from(["if_slurper", "optimize", "--trials", "4", "--step-seconds", "0.5"]);
        let mut settings = Settings::default();
        args.apply(&mut settings);
        assert_eq!(settings.optimizer.trials, 4);
        assert_eq!(settings.optimizer.step_seconds, 0.5);
        assert_eq!(settings.optimizer.total_seconds, 10.0);
    }

    #[test]
    fn test_zero_segment_rejected() {
        assert!(Args::try_parse_from(["if_slurper", "stream", "--segment-ms", "0"]).is_err());
    }

    #[test]
    fn test_verbosity_maps_to_tracing() {
        assert_eq!(
            convert_filter(log::LevelFilter::Debug),
            tracing_subscriber::filter::LevelFilter::DEBUG
        );
    }
}
