//! End to end capture and cadence sweeps against the simulated analyzer

use std::{fs, path::Path, process::Command, time::Duration};

use if_slurper::{
    error::{Operation, StatusKind},
    sim::{SimSettings, SimulatedDevice},
    stream::{OutputMode, SuffixPolicy},
    AcquisitionController, CadenceOptimizer, DeviceSession, Error, FileRelocator, StreamConfig,
};

fn config(dir: &Path, segment_ms: u32, count: u32) -> StreamConfig {
    StreamConfig {
        output_dir: dir.to_path_buf(),
        filename_base: "if_capture".to_owned(),
        suffix: SuffixPolicy::Timestamp,
        segment_duration_ms: segment_ms,
        retained_segment_count: count,
        output_mode: OutputMode::Formatted,
    }
}

fn connected(sim: SimulatedDevice) -> DeviceSession<SimulatedDevice> {
    let mut session = DeviceSession::new(sim);
    session.connect(None).unwrap();
    session.preset().unwrap();
    session.set_center_frequency(1420e6).unwrap();
    session.set_reference_level(0.0).unwrap();
    session
}

#[test]
fn test_capture_then_relocate() {
    let tmp = tempfile::tempdir().unwrap();
    let temp_dir = tmp.path().join("ramdisk").join("IF_data_temp");
    let dest_dir = tmp.path().join("IF_data_dump");

    let mut session = connected(SimulatedDevice::new(SimSettings::default()));
    let mut controller = AcquisitionController::new(Duration::from_millis(2), Duration::from_secs(5));
    controller
        .configure(&mut session, config(&temp_dir, 10, 5))
        .unwrap();
    let result = controller.run(&mut session).unwrap();
    assert_eq!(result.segment_count, 5);
    // Five 10 ms segments cannot finish faster than 50 ms of wall time
    assert!(result.elapsed >= Duration::from_millis(50));
    assert!(result.achieved_rate <= 1000.0);

    let report = FileRelocator::relocate(&temp_dir, &dest_dir).unwrap();
    assert_eq!(report.moved(), 5);
    assert_eq!(fs::read_dir(&temp_dir).unwrap().count(), 0);
    let names: Vec<String> = fs::read_dir(&dest_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| n.starts_with("if_capture-") && n.ends_with(".r3f")));

    assert_eq!(FileRelocator::relocate(&temp_dir, &dest_dir).unwrap().moved(), 0);
    session.disconnect().unwrap();
    assert!(!session.api().is_connected());
}

#[test]
fn test_sweep_against_overhead_bound_device() {
    let tmp = tempfile::tempdir().unwrap();
    // With a large fixed cost per file, longer segments always stream faster
    let sim = SimulatedDevice::new(SimSettings {
        time_scale: 0.01,
        per_file_overhead: Duration::from_millis(20),
        ..Default::default()
    });
    let mut session = connected(sim);
    let mut controller = AcquisitionController::new(Duration::from_millis(1), Duration::from_secs(10));
    let optimizer = CadenceOptimizer::new(2.0, 4, 0.25).unwrap();

    let report = optimizer
        .sweep(&mut session, &mut controller, &config(tmp.path(), 1, 1))
        .unwrap();
    assert_eq!(report.record.len(), 4);
    assert_eq!(report.optimum.segment_ms, 1000);
    for trial in report.record.trials() {
        assert!(trial.rate <= report.optimum.rate);
    }

    let csv = tmp.path().join("cadence.csv");
    report.write_csv(&csv).unwrap();
    assert_eq!(fs::read_to_string(&csv).unwrap().lines().count(), 5);
}

#[test]
fn test_transfer_fault_aborts_sweep_and_stops_device() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sim = SimulatedDevice::new(SimSettings::default());
    sim.fail(Operation::GetActiveStatus, StatusKind::TRANSFER);
    let mut session = connected(sim);
    let mut controller = AcquisitionController::new(Duration::from_millis(1), Duration::from_secs(1));
    let optimizer = CadenceOptimizer::new(1.0, 3, 0.1).unwrap();

    let err = optimizer
        .sweep(&mut session, &mut controller, &config(tmp.path(), 1, 1))
        .unwrap_err();
    assert!(matches!(err, Error::Transfer { .. }));
    assert!(!session.is_running());
    let runs = session
        .api()
        .calls()
        .iter()
        .filter(|op| **op == Operation::Run)
        .count();
    assert_eq!(runs, 1);
}

#[test]
fn test_cli_stream_simulated() {
    let tmp = tempfile::tempdir().unwrap();
    let temp_dir = tmp.path().join("temp");
    let dest_dir = tmp.path().join("dest");
    let status = Command::new(env!("CARGO_BIN_EXE_if_slurper"))
        .args(["-q", "--simulate", "stream", "--segment-ms", "5", "--record-seconds", "0.02"])
        .arg("--temp-dir")
        .arg(&temp_dir)
        .arg("--dest-dir")
        .arg(&dest_dir)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(fs::read_dir(&dest_dir).unwrap().count(), 4);
}

#[test]
fn test_cli_rejects_unrepresentable_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_if_slurper"))
        .args(["-q", "--simulate", "--drain-timeout", "1e300", "stream"])
        .arg("--temp-dir")
        .arg(tmp.path().join("temp"))
        .arg("--dest-dir")
        .arg(tmp.path().join("dest"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_cli_rejects_single_trial() {
    let tmp = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_if_slurper"))
        .args(["-q", "--simulate", "optimize", "--trials", "1"])
        .arg("--output-dir")
        .arg(tmp.path())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}
