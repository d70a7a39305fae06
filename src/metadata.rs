//! Recording metadata records.
//!
//! Two records describe a run: a [`SessionMetadata`] side-car written once
//! per recording segment next to its output file, and an
//! [`ExperimentRecord`] summarizing the whole run across repetitions.
//! Both are serialized in full before a single write call, so a record
//! either exists completely or not at all.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::SourceInfo;
use crate::error::AppResult;
use crate::sink::SinkInfo;

/// Snapshot record describing one completed recording segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    /// Camera kind ("thermal" or "vision").
    pub camera: String,
    /// Sensor width in pixels.
    pub width: u32,
    /// Sensor height in pixels.
    pub height: u32,
    /// Configured frame rate.
    pub frame_rate_fps: f64,
    /// File name of the output sink.
    pub output_file: String,
    /// Container format of the output sink.
    pub video_format: String,
    /// Number of persisted frames; equals the timestamp log's row count.
    pub number_of_frames: u64,
    /// Lower display temperature bound, thermal only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_min: Option<f64>,
    /// Upper display temperature bound, thermal only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_max: Option<f64>,
    /// Whether the FFC shutter was under manual control, thermal only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutter_manual: Option<bool>,
}

impl SessionMetadata {
    /// Assemble the record from the source and sink snapshots.
    pub fn new(source: &SourceInfo, sink: &SinkInfo, number_of_frames: u64) -> Self {
        Self {
            camera: source.kind.to_string(),
            width: source.width,
            height: source.height,
            frame_rate_fps: source.frame_rate_fps,
            output_file: sink.output_file.clone(),
            video_format: sink.video_format.to_string(),
            number_of_frames,
            temperature_min: source.temperature_min,
            temperature_max: source.temperature_max,
            shutter_manual: source.shutter_manual,
        }
    }

    /// Persist the record as pretty-printed JSON in a single write.
    pub fn write(&self, path: &Path) -> AppResult<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

/// Per-segment summary embedded in the experiment record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentSummary {
    /// 1-based repetition index.
    pub repetition: u32,
    /// File name of the segment's output sink.
    pub output_file: String,
    /// File name of the segment's timestamp log.
    pub timestamps_file: String,
    /// File name of the segment's metadata side-car.
    pub metadata_file: String,
    /// Frames persisted in this segment.
    pub frame_count: u64,
}

/// One record per run, covering every repetition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentRecord {
    /// Experiment name, used in file naming and record keeping.
    pub experiment_name: String,
    /// Wall-clock start of the run.
    pub started_at: chrono::DateTime<chrono::Local>,
    /// Version of the acquisition software.
    pub software_version: String,
    /// Camera kind used for the run.
    pub camera: String,
    /// Configured repetitions.
    pub repetitions: u32,
    /// Inter-repetition buffer in seconds.
    pub buffer_s: f64,
    /// Configured duration per segment, when bounded by time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
    /// Completed segments in order.
    pub segments: Vec<SegmentSummary>,
}

impl ExperimentRecord {
    /// Persist the record as pretty-printed JSON in a single write.
    pub fn write(&self, path: &Path) -> AppResult<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraKind;
    use tempfile::TempDir;

    fn thermal_info() -> SourceInfo {
        SourceInfo {
            kind: CameraKind::Thermal,
            width: 160,
            height: 120,
            frame_rate_fps: 8.7,
            temperature_min: Some(30.0),
            temperature_max: Some(34.0),
            shutter_manual: Some(false),
        }
    }

    #[test]
    fn side_car_round_trips_through_json() {
        let sink = SinkInfo {
            output_file: "thermal-camera_run1.hdf5".to_string(),
            video_format: "hdf5",
        };
        let meta = SessionMetadata::new(&thermal_info(), &sink, 87);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thermal-camera_run1.json");
        meta.write(&path).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let parsed: SessionMetadata = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.number_of_frames, 87);
        assert_eq!(parsed.camera, "thermal");
    }

    #[test]
    fn vision_side_car_omits_thermal_fields() {
        let info = SourceInfo {
            kind: CameraKind::Vision,
            width: 640,
            height: 480,
            frame_rate_fps: 30.0,
            temperature_min: None,
            temperature_max: None,
            shutter_manual: None,
        };
        let sink = SinkInfo {
            output_file: "vision-camera_run1.tiff".to_string(),
            video_format: "tiff-stack",
        };
        let meta = SessionMetadata::new(&info, &sink, 300);
        let body = serde_json::to_string(&meta).unwrap();
        assert!(!body.contains("temperature_min"));
        assert!(!body.contains("shutter_manual"));
    }

    #[test]
    fn experiment_record_lists_segments() {
        let record = ExperimentRecord {
            experiment_name: "pilot".to_string(),
            started_at: chrono::Local::now(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            camera: "vision".to_string(),
            repetitions: 2,
            buffer_s: 5.0,
            duration_s: Some(10.0),
            segments: vec![SegmentSummary {
                repetition: 1,
                output_file: "a.tiff".to_string(),
                timestamps_file: "a_timestamps.csv".to_string(),
                metadata_file: "a.json".to_string(),
                frame_count: 10,
            }],
        };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pilot_experiment.json");
        record.write(&path).unwrap();
        let parsed: ExperimentRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.segments[0].frame_count, 10);
    }
}
