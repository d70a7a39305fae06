//! Recording session orchestration.
//!
//! A session drives one camera through the state machine
//! `Idle -> Previewing -> Recording -> Finalizing -> Closed`, pulling
//! frames in a single blocking loop and fanning each one out to the output
//! sink and the timestamp log. A run may repeat the preview/record cycle a
//! configured number of times with a fixed buffer pause in between; every
//! repetition gets its own sink, timestamp log and metadata side-car, and
//! the run as a whole gets one experiment record.
//!
//! Failure scoping follows the error taxonomy: a missing frame becomes a
//! placeholder, a failed persist loses that entry pair, and only a
//! device-level fault (or the cooperative stop flag, checked once per
//! iteration) ends the segment early. Finalizing runs on every exit path,
//! so file handles never leak past the segment that opened them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::FrameSource;
use crate::data::Frame;
use crate::error::{AppResult, CamError};
use crate::metadata::{ExperimentRecord, SegmentSummary, SessionMetadata};
use crate::sink::timestamps::TimestampLog;
use crate::sink::{open_sink, SinkKind};

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Device open but not streaming.
    Idle,
    /// Streaming with frames discarded, for operator placement checks.
    Previewing,
    /// Streaming with every frame persisted.
    Recording,
    /// Sinks flushing, metadata being written.
    Finalizing,
    /// Device released; the session is spent.
    Closed,
}

/// Cooperative stop flag shared with the session loop.
///
/// The loop checks the flag once per iteration, between frames; there is
/// no preemptive cancellation.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request that the session stop after the frame in flight.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounds and pacing of a recording run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Stop each segment after this many seconds of capture. Converted to
    /// a frame budget of `ceil(duration_s * fps)` up front, so the final
    /// in-progress frame is never truncated.
    pub duration_s: Option<f64>,
    /// Stop each segment after this many frames. Takes precedence over
    /// `duration_s` when both are set.
    pub frame_budget: Option<u64>,
    /// Number of preview/record repetitions.
    pub total_rec: u32,
    /// Pause between repetitions in seconds, skipped after the last.
    pub buffer_s: f64,
    /// Preview length in seconds before each recording; 0 skips preview.
    pub preview_s: f64,
    /// Per-frame pull timeout.
    pub grab_timeout: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration_s: None,
            frame_budget: None,
            total_rec: 1,
            buffer_s: 0.0,
            preview_s: 0.0,
            grab_timeout: Duration::from_secs(5),
        }
    }
}

/// Where a session's files land and how they are named.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    /// Directory receiving every file of the run.
    pub dir: PathBuf,
    /// Base file name, e.g. `thermal-camera`.
    pub base_name: String,
    /// Extra name component identifying the run, e.g. a subject id.
    pub tag: String,
}

impl SessionPaths {
    /// Stem shared by a segment's sink, timestamp log and side-car.
    /// Repetition indices only appear when a run has more than one.
    pub fn segment_stem(&self, repetition: u32, total: u32) -> String {
        if total > 1 {
            format!("{}_{}_rep{}", self.base_name, self.tag, repetition)
        } else {
            format!("{}_{}", self.base_name, self.tag)
        }
    }

    /// Output sink path for a repetition.
    pub fn sink_path(&self, repetition: u32, total: u32, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{extension}", self.segment_stem(repetition, total)))
    }

    /// Timestamp log path for a repetition.
    pub fn timestamps_path(&self, repetition: u32, total: u32) -> PathBuf {
        self.dir
            .join(format!("{}_timestamps.csv", self.segment_stem(repetition, total)))
    }

    /// Metadata side-car path for a repetition.
    pub fn metadata_path(&self, repetition: u32, total: u32) -> PathBuf {
        self.dir
            .join(format!("{}.json", self.segment_stem(repetition, total)))
    }

    /// Experiment record path for the whole run.
    pub fn experiment_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_{}_experiment.json", self.base_name, self.tag))
    }
}

/// One bounded recording activity from start to finalize.
pub struct RecordingSession {
    camera: Box<dyn FrameSource>,
    sink_kind: SinkKind,
    paths: SessionPaths,
    config: RecordingConfig,
    state: SessionState,
    stop: StopHandle,
}

impl RecordingSession {
    /// Assemble a session around an already-opened camera.
    pub fn new(
        camera: Box<dyn FrameSource>,
        sink_kind: SinkKind,
        paths: SessionPaths,
        config: RecordingConfig,
    ) -> Self {
        Self {
            camera,
            sink_kind,
            paths,
            config,
            state: SessionState::Idle,
            stop: StopHandle::default(),
        }
    }

    /// Handle for requesting a cooperative stop.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames one segment must capture, derived from the configured
    /// bounds; `None` means record until stopped.
    fn segment_budget(&self) -> AppResult<Option<u64>> {
        if let Some(budget) = self.config.frame_budget {
            return Ok(Some(budget));
        }
        match self.config.duration_s {
            None => Ok(None),
            Some(duration_s) => {
                let fps = self.camera.info().frame_rate_fps;
                if fps <= 0.0 {
                    return Err(CamError::Configuration(
                        "frame rate must be positive to bound a recording by time".to_string(),
                    ));
                }
                Ok(Some((duration_s * fps).ceil() as u64))
            }
        }
    }

    /// Run the whole session: every repetition, the buffer pauses, and the
    /// final experiment record.
    ///
    /// The experiment record is written even when a device fault ends the
    /// run early; the fault is then propagated to the caller.
    pub fn run(&mut self, experiment_name: &str) -> AppResult<ExperimentRecord> {
        std::fs::create_dir_all(&self.paths.dir)?;
        let budget = self.segment_budget()?;
        let started_at = chrono::Local::now();

        self.camera.start()?;
        tracing::info!(
            camera = %self.camera.info().kind,
            repetitions = self.config.total_rec,
            "recording session started"
        );

        let mut segments = Vec::new();
        let mut fault: Option<CamError> = None;

        for repetition in 1..=self.config.total_rec {
            if self.stop.is_requested() {
                break;
            }

            if self.config.preview_s > 0.0 {
                if let Err(err) = self.preview() {
                    fault = Some(err);
                    break;
                }
            }

            match self.record_segment(repetition, budget) {
                Ok((summary, segment_fault)) => {
                    segments.push(summary);
                    if let Some(err) = segment_fault {
                        fault = Some(err);
                        break;
                    }
                }
                Err(err) => {
                    fault = Some(err);
                    break;
                }
            }

            if repetition < self.config.total_rec && !self.stop.is_requested() {
                tracing::info!(seconds = self.config.buffer_s, "inter-repetition buffer");
                self.pause(self.config.buffer_s);
            }
        }

        self.camera.stop();
        self.state = SessionState::Closed;

        let info = self.camera.info();
        let record = ExperimentRecord {
            experiment_name: experiment_name.to_string(),
            started_at,
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            camera: info.kind.to_string(),
            repetitions: self.config.total_rec,
            buffer_s: self.config.buffer_s,
            duration_s: self.config.duration_s,
            segments,
        };
        if let Err(err) = record.write(&self.paths.experiment_path()) {
            tracing::warn!(error = %err, "experiment record lost");
        }

        match fault {
            Some(err) => Err(err),
            None => Ok(record),
        }
    }

    /// Stream and discard frames so an operator can confirm placement.
    fn preview(&mut self) -> AppResult<()> {
        self.state = SessionState::Previewing;
        tracing::info!(seconds = self.config.preview_s, "previewing");
        let deadline = Instant::now() + Duration::from_secs_f64(self.config.preview_s);
        while Instant::now() < deadline {
            if self.stop.is_requested() {
                break;
            }
            match self.camera.get_frame(self.config.grab_timeout) {
                crate::device::Grab::Image(_) | crate::device::Grab::Timeout => {}
                crate::device::Grab::Fault(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Capture one segment. Finalizes its files on every exit path; a
    /// device fault is returned alongside the summary so the caller can
    /// both keep the segment and abort the run.
    fn record_segment(
        &mut self,
        repetition: u32,
        budget: Option<u64>,
    ) -> AppResult<(SegmentSummary, Option<CamError>)> {
        let total = self.config.total_rec;
        let sink_path = self
            .paths
            .sink_path(repetition, total, self.sink_kind.extension());
        let mut sink = open_sink(self.sink_kind, &sink_path)?;
        let mut timestamps = TimestampLog::create(&self.paths.timestamps_path(repetition, total))?;

        self.state = SessionState::Recording;
        tracing::info!(repetition, output = %sink_path.display(), "recording");

        let start = Instant::now();
        let mut seq: u64 = 0;
        let mut fault = None;

        loop {
            if self.stop.is_requested() {
                tracing::info!("stop requested, finalizing");
                break;
            }
            if let Some(budget) = budget {
                if seq >= budget {
                    break;
                }
            }

            let image = match self.camera.get_frame(self.config.grab_timeout) {
                crate::device::Grab::Image(image) => image,
                crate::device::Grab::Timeout => {
                    tracing::warn!(seq = seq + 1, "frame missing, substituting placeholder");
                    self.camera.placeholder()
                }
                crate::device::Grab::Fault(err) => {
                    tracing::error!(error = %err, "device fault, aborting segment");
                    fault = Some(err);
                    break;
                }
            };

            seq += 1;
            let frame = Frame {
                seq,
                elapsed_s: start.elapsed().as_secs_f64(),
                image,
            };

            // The sink entry and the timestamp row succeed or are lost as
            // a pair, keeping both sides aligned.
            match sink.append(&frame) {
                Ok(()) => {
                    if let Err(err) = timestamps.append(frame.elapsed_s) {
                        tracing::warn!(seq, error = %err, "timestamp row lost");
                    }
                }
                Err(err) => {
                    tracing::warn!(seq, error = %err, "frame persist failed, entry lost");
                }
            }
        }

        self.state = SessionState::Finalizing;
        if let Err(err) = sink.finalize() {
            tracing::warn!(error = %err, "sink finalize failed");
        }
        if let Err(err) = timestamps.finalize() {
            tracing::warn!(error = %err, "timestamp log finalize failed");
        }

        let frame_count = timestamps.rows();
        let metadata = SessionMetadata::new(&self.camera.info(), &sink.info(), frame_count);
        let metadata_path = self.paths.metadata_path(repetition, total);
        if let Err(err) = metadata.write(&metadata_path) {
            tracing::warn!(error = %err, "metadata side-car lost");
        }

        tracing::info!(repetition, frames = frame_count, "segment finalized");
        let summary = SegmentSummary {
            repetition,
            output_file: sink.info().output_file,
            timestamps_file: file_name_of(timestamps.path().to_path_buf()),
            metadata_file: file_name_of(metadata_path),
            frame_count,
        };
        Ok((summary, fault))
    }

    /// Sleep for the inter-repetition buffer, staying responsive to the
    /// stop flag.
    fn pause(&self, seconds: f64) {
        let deadline = Instant::now() + Duration::from_secs_f64(seconds);
        while Instant::now() < deadline {
            if self.stop.is_requested() {
                return;
            }
            let remaining = deadline - Instant::now();
            std::thread::sleep(remaining.min(Duration::from_millis(50)));
        }
    }
}

fn file_name_of(path: PathBuf) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_run_paths_carry_no_repetition_index() {
        let paths = SessionPaths {
            dir: PathBuf::from("/data"),
            base_name: "thermal-camera".to_string(),
            tag: "subject42".to_string(),
        };
        assert_eq!(
            paths.sink_path(1, 1, "hdf5"),
            PathBuf::from("/data/thermal-camera_subject42.hdf5")
        );
        assert_eq!(
            paths.timestamps_path(1, 1),
            PathBuf::from("/data/thermal-camera_subject42_timestamps.csv")
        );
    }

    #[test]
    fn repeated_runs_number_each_segment() {
        let paths = SessionPaths {
            dir: PathBuf::from("/data"),
            base_name: "vision-camera".to_string(),
            tag: "pilot".to_string(),
        };
        assert_eq!(
            paths.sink_path(2, 3, "tiff"),
            PathBuf::from("/data/vision-camera_pilot_rep2.tiff")
        );
        assert_eq!(
            paths.metadata_path(3, 3),
            PathBuf::from("/data/vision-camera_pilot_rep3.json")
        );
        assert_eq!(
            paths.experiment_path(),
            PathBuf::from("/data/vision-camera_pilot_experiment.json")
        );
    }

    #[test]
    fn stop_handle_is_shared() {
        let handle = StopHandle::default();
        let clone = handle.clone();
        assert!(!clone.is_requested());
        handle.request_stop();
        assert!(clone.is_requested());
    }
}
