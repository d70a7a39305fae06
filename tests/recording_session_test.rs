//! Integration tests for the recording session loop.
//!
//! These run the full open -> stream -> capture -> persist -> finalize
//! protocol against the simulated links, at high frame rates so the suite
//! stays fast, and assert the invariants every completed recording must
//! hold: aligned counts, contiguous sequence numbers, non-decreasing
//! timestamps, and metadata that matches what was persisted.

use std::path::Path;
use std::time::{Duration, Instant};

use camdaq::camera::sim::SimLinkConfig;
use camdaq::camera::vision::VisionCamera;
use camdaq::error::CamError;
use camdaq::metadata::{ExperimentRecord, SessionMetadata};
use camdaq::session::{RecordingConfig, RecordingSession, SessionPaths};
use camdaq::sink::timestamps::read_timestamps;
use camdaq::sink::SinkKind;
use tempfile::TempDir;

fn fast_vision(fps: f64) -> SimLinkConfig {
    SimLinkConfig {
        frame_rate_fps: fps,
        width: 16,
        height: 12,
        seed: Some(42),
        ..SimLinkConfig::vision()
    }
}

fn paths_in(dir: &Path, tag: &str) -> SessionPaths {
    SessionPaths {
        dir: dir.to_path_buf(),
        base_name: "vision-camera".to_string(),
        tag: tag.to_string(),
    }
}

fn read_metadata(path: &Path) -> SessionMetadata {
    let body = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&body).unwrap()
}

fn count_tiffs(dir: &Path, stem: &str) -> u64 {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with(&format!("{stem}_")) && name.ends_with(".tiff")
        })
        .count() as u64
}

#[test]
fn bounded_duration_records_ceil_of_duration_over_interval() {
    let dir = TempDir::new().unwrap();
    let mut camera = VisionCamera::simulated_with(fast_vision(50.0));
    camera.open().unwrap();
    camera.set_frame_rate(50.0).unwrap();

    let config = RecordingConfig {
        // 0.2 s at 50 fps: exactly ceil(0.2 / 0.02) = 10 frames.
        duration_s: Some(0.2),
        grab_timeout: Duration::from_millis(500),
        ..RecordingConfig::default()
    };
    let mut session = RecordingSession::new(
        Box::new(camera),
        SinkKind::TiffStack,
        paths_in(dir.path(), "bounded"),
        config,
    );
    let record = session.run("bounded").unwrap();

    assert_eq!(record.segments.len(), 1);
    assert_eq!(record.segments[0].frame_count, 10);

    let timestamps = read_timestamps(&dir.path().join("vision-camera_bounded_timestamps.csv"))
        .unwrap();
    assert_eq!(timestamps.len(), 10);
    assert!(timestamps[0] >= 0.0);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

    let metadata = read_metadata(&dir.path().join("vision-camera_bounded.json"));
    assert_eq!(metadata.number_of_frames, 10);
    assert_eq!(metadata.camera, "vision");
    assert_eq!((metadata.width, metadata.height), (16, 12));

    // One persisted frame per timestamp row.
    assert_eq!(count_tiffs(dir.path(), "vision-camera_bounded"), 10);
}

#[test]
fn missing_frames_are_filled_with_placeholders() {
    let dir = TempDir::new().unwrap();
    let mut camera = VisionCamera::simulated_with(SimLinkConfig {
        // Withhold every 3rd frame so grabs time out mid-run.
        drop_every: Some(3),
        ..fast_vision(50.0)
    });
    camera.open().unwrap();

    let config = RecordingConfig {
        frame_budget: Some(12),
        grab_timeout: Duration::from_millis(30),
        ..RecordingConfig::default()
    };
    let mut session = RecordingSession::new(
        Box::new(camera),
        SinkKind::TiffStack,
        paths_in(dir.path(), "gaps"),
        config,
    );
    let record = session.run("gaps").unwrap();

    // Placeholders keep the sequence contiguous: the budget is met and
    // every entry has a sink file and a timestamp row.
    assert_eq!(record.segments[0].frame_count, 12);
    let timestamps =
        read_timestamps(&dir.path().join("vision-camera_gaps_timestamps.csv")).unwrap();
    assert_eq!(timestamps.len(), 12);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    for seq in 1..=12u64 {
        assert!(
            dir.path()
                .join(format!("vision-camera_gaps_{seq:06}.tiff"))
                .exists(),
            "missing frame file for seq {seq}"
        );
    }
}

#[test]
fn repetitions_produce_independent_segments_with_a_buffer_gap() {
    let dir = TempDir::new().unwrap();
    let mut camera = VisionCamera::simulated_with(fast_vision(100.0));
    camera.open().unwrap();

    let config = RecordingConfig {
        frame_budget: Some(5),
        total_rec: 2,
        buffer_s: 0.4,
        grab_timeout: Duration::from_millis(500),
        ..RecordingConfig::default()
    };
    let mut session = RecordingSession::new(
        Box::new(camera),
        SinkKind::TiffStack,
        paths_in(dir.path(), "reps"),
        config,
    );

    let started = Instant::now();
    let record = session.run("reps").unwrap();
    let elapsed = started.elapsed();

    assert_eq!(record.segments.len(), 2);
    for repetition in 1..=2u32 {
        let stem = format!("vision-camera_reps_rep{repetition}");
        let metadata = read_metadata(&dir.path().join(format!("{stem}.json")));
        assert_eq!(metadata.number_of_frames, 5);
        let timestamps =
            read_timestamps(&dir.path().join(format!("{stem}_timestamps.csv"))).unwrap();
        assert_eq!(timestamps.len(), 5);
    }

    // The inter-repetition buffer ran between the two segments.
    assert!(
        elapsed >= Duration::from_millis(400),
        "run finished in {elapsed:?}, before the buffer could have elapsed"
    );

    // The run-level record ties the segments together.
    let experiment: ExperimentRecord = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("vision-camera_reps_experiment.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(experiment.repetitions, 2);
    assert_eq!(experiment.buffer_s, 0.4);
    assert_eq!(experiment.segments.len(), 2);
}

#[test]
fn device_fault_finalizes_before_propagating() {
    let dir = TempDir::new().unwrap();
    let mut camera = VisionCamera::simulated_with(SimLinkConfig {
        die_after: Some(4),
        ..fast_vision(100.0)
    });
    camera.open().unwrap();

    let config = RecordingConfig {
        // Unbounded: only the fault can end this segment.
        grab_timeout: Duration::from_millis(200),
        ..RecordingConfig::default()
    };
    let mut session = RecordingSession::new(
        Box::new(camera),
        SinkKind::TiffStack,
        paths_in(dir.path(), "fault"),
        config,
    );
    let err = session.run("fault").unwrap_err();
    assert!(matches!(err, CamError::DeviceFault(_)));

    // The segment was still finalized: side-car and log agree.
    let metadata = read_metadata(&dir.path().join("vision-camera_fault.json"));
    let timestamps =
        read_timestamps(&dir.path().join("vision-camera_fault_timestamps.csv")).unwrap();
    assert_eq!(metadata.number_of_frames, timestamps.len() as u64);

    // The run-level record exists even for an aborted run.
    assert!(dir.path().join("vision-camera_fault_experiment.json").exists());
}

#[test]
fn stop_flag_ends_an_unbounded_recording() {
    let dir = TempDir::new().unwrap();
    let mut camera = VisionCamera::simulated_with(fast_vision(100.0));
    camera.open().unwrap();

    let config = RecordingConfig {
        grab_timeout: Duration::from_millis(200),
        ..RecordingConfig::default()
    };
    let mut session = RecordingSession::new(
        Box::new(camera),
        SinkKind::TiffStack,
        paths_in(dir.path(), "stopped"),
        config,
    );

    let stop = session.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        stop.request_stop();
    });

    let record = session.run("stopped").unwrap();
    stopper.join().unwrap();

    assert_eq!(record.segments.len(), 1);
    let frame_count = record.segments[0].frame_count;
    assert!(frame_count > 0, "no frames captured before the stop");
    let timestamps =
        read_timestamps(&dir.path().join("vision-camera_stopped_timestamps.csv")).unwrap();
    assert_eq!(timestamps.len() as u64, frame_count);
}

#[test]
fn preview_phase_is_not_persisted() {
    let dir = TempDir::new().unwrap();
    let mut camera = VisionCamera::simulated_with(fast_vision(100.0));
    camera.open().unwrap();

    let config = RecordingConfig {
        frame_budget: Some(4),
        preview_s: 0.1,
        grab_timeout: Duration::from_millis(500),
        ..RecordingConfig::default()
    };
    let mut session = RecordingSession::new(
        Box::new(camera),
        SinkKind::TiffStack,
        paths_in(dir.path(), "previewed"),
        config,
    );
    let record = session.run("previewed").unwrap();

    // Only the recorded frames reach the sink; previewed frames are gone.
    assert_eq!(record.segments[0].frame_count, 4);
    assert_eq!(count_tiffs(dir.path(), "vision-camera_previewed"), 4);
}

#[test]
fn hdf5_sink_without_the_feature_is_rejected_cleanly() {
    #[cfg(not(feature = "storage_hdf5"))]
    {
        let dir = TempDir::new().unwrap();
        let mut camera = VisionCamera::simulated_with(fast_vision(100.0));
        camera.open().unwrap();

        let config = RecordingConfig {
            frame_budget: Some(2),
            ..RecordingConfig::default()
        };
        let mut session = RecordingSession::new(
            Box::new(camera),
            SinkKind::Hdf5Dataset,
            paths_in(dir.path(), "nofeature"),
            config,
        );
        let err = session.run("nofeature").unwrap_err();
        assert!(matches!(err, CamError::FeatureNotEnabled("storage_hdf5")));
        // Configuration misuse corrupts nothing: no partial outputs.
        assert_eq!(count_tiffs(dir.path(), "vision-camera_nofeature"), 0);
    }
}
