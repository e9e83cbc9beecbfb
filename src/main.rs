use std::{path::PathBuf, process::ExitCode};

use chrono::{DateTime, Datelike, Timelike, Utc};
use clap::Parser;
use if_slurper::{
    args::{convert_filter, Args, Command},
    config::Settings,
    sim::{SimSettings, SimulatedDevice},
    stream::estimate_file_size_mib,
    AcquisitionController, CadenceOptimizer, DeviceApi, DeviceSession, Error, FileRelocator,
    Result,
};
use tracing::{error, info, warn};

/// Timestamp used to name report files
fn report_timestamp(time: &DateTime<Utc>) -> String {
    format!(
        "{}-{:02}-{:02}-{:02}:{:02}:{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

/// Connect, preset and tune
fn open<D: DeviceApi>(api: D, settings: &Settings) -> Result<DeviceSession<D>> {
    let mut session = DeviceSession::new(api);
    session.connect(settings.device.serial.as_deref())?;
    session.preset()?;
    session.set_center_frequency(settings.device.center_frequency_hz)?;
    session.set_reference_level(settings.device.reference_level_dbm)?;
    Ok(session)
}

fn stream<D: DeviceApi>(api: D, settings: &Settings) -> Result<()> {
    let config = settings.stream.to_config();
    let file_mib = estimate_file_size_mib(settings.device.sample_rate_hz, config.segment_duration_ms);
    info!("Configuration:");
    info!("  Center frequency: {} MHz", settings.device.center_frequency_hz / 1e6);
    info!("  Reference level: {} dBm", settings.device.reference_level_dbm);
    info!("  Individual file length: {} ms", config.segment_duration_ms);
    info!("  Number of files to keep: {}", config.retained_segment_count);
    info!("  Expected file size: {file_mib:.1} MiB");
    info!(
        "  Total memory required: {:.1} MiB",
        file_mib * config.retained_segment_count as f64
    );

    let mut session = open(api, settings)?;
    let mut controller = AcquisitionController::new(
        settings.acquisition.poll_interval(),
        settings.acquisition.drain_timeout(),
    );
    controller.configure(&mut session, config)?;
    match controller.run(&mut session) {
        Ok(result) => info!(
            "Captured {} x {} ms in {:.3} s ({:.2} ms/s)",
            result.segment_count,
            result.segment_duration_ms,
            result.elapsed.as_secs_f64(),
            result.achieved_rate
        ),
        // Whatever made it to disk is still worth keeping
        Err(Error::DrainTimeout(result)) => warn!(
            "Capture forcibly stopped after {:.3} s",
            result.elapsed.as_secs_f64()
        ),
        Err(e) => return Err(e),
    }

    let report = FileRelocator::relocate(&settings.stream.temp_dir, &settings.stream.dest_dir)?;
    let failed = report.failures().count();
    if failed > 0 {
        warn!("{failed} files could not be moved and remain in {}", settings.stream.temp_dir.display());
    }
    session.disconnect()?;
    info!("IF streaming completed successfully!");
    Ok(())
}

fn optimize<D: DeviceApi>(api: D, settings: &Settings, report: Option<PathBuf>) -> Result<()> {
    let opt = &settings.optimizer;
    let optimizer = CadenceOptimizer::new(opt.total_seconds, opt.trials, opt.step_seconds)?;
    let mut session = open(api, settings)?;
    let mut controller = AcquisitionController::new(
        std::time::Duration::from_millis(opt.poll_interval_ms),
        settings.acquisition.drain_timeout(),
    );
    let template = if_slurper::StreamConfig {
        output_dir: opt.output_dir.clone(),
        ..settings.stream.to_config()
    };
    let result = optimizer.sweep(&mut session, &mut controller, &template)?;
    if let Some(path) = report {
        result.write_csv(&path)?;
        info!("Wrote trial report to {}", path.display());
    }
    session.disconnect()?;
    info!("Benchmark completed.");
    Ok(())
}

fn run_with<D: DeviceApi>(api: D, args: &Args, settings: &Settings) -> Result<()> {
    match &args.command {
        Command::Stream { .. } => stream(api, settings),
        Command::Optimize {
            report, report_dir, ..
        } => {
            let report = report.clone().or_else(|| {
                report_dir
                    .as_ref()
                    .map(|dir| dir.join(format!("cadence-{}.csv", report_timestamp(&Utc::now()))))
            });
            optimize(api, settings, report)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    settings.validate()?;
    if args.simulate {
        info!("Using simulated analyzer");
        return run_with(SimulatedDevice::new(SimSettings::default()), args, &settings);
    }
    run_hardware(args, &settings)
}

#[cfg(feature = "rsa-api")]
fn run_hardware(args: &Args, settings: &Settings) -> Result<()> {
    run_with(if_slurper::rsa::RsaDevice::new(), args, settings)
}

#[cfg(not(feature = "rsa-api"))]
fn run_hardware(_args: &Args, _settings: &Settings) -> Result<()> {
    error!("Built without the rsa-api feature, use --simulate or rebuild with --features rsa-api");
    Err(Error::NotSupported {
        op: if_slurper::error::Operation::GetApiVersion,
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
