//! Configuration loading and validation.
//!
//! Settings come from a TOML file merged with `CAMDAQ_`-prefixed
//! environment variables, extracted into strongly-typed sections. A
//! `validate()` pass catches values that parse but make no sense (zero
//! frame rates, inverted temperature bounds, a log level nobody knows).
//!
//! # Example
//! ```no_run
//! use camdaq::config::Settings;
//!
//! # fn main() -> Result<(), camdaq::error::CamError> {
//! let settings = Settings::load_from("config/camdaq.toml")?;
//! settings.validate().map_err(camdaq::error::CamError::Configuration)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::camera::thermal::ThermalBounds;
use crate::session::RecordingConfig;
use crate::sink::SinkKind;

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application-level settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Where recordings land.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Thermal camera parameters.
    #[serde(default)]
    pub thermal: ThermalConfig,
    /// Vision camera parameters.
    #[serde(default)]
    pub vision: VisionConfig,
    /// Recording bounds and pacing.
    #[serde(default)]
    pub recording: RecordingSection,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Experiment name used in record keeping.
    pub experiment_name: String,
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Error-log file; operator-relevant failures append here once set.
    /// Without it, failures go to the console.
    pub error_log: Option<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            experiment_name: "experiment".to_string(),
            log_level: "info".to_string(),
            error_log: None,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory for data files.
    pub output_dir: PathBuf,
    /// Sink container for thermal recordings.
    pub thermal_sink: SinkKind,
    /// Sink container for vision recordings.
    pub vision_sink: SinkKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            thermal_sink: SinkKind::Hdf5Dataset,
            vision_sink: SinkKind::TiffStack,
        }
    }
}

/// Thermal camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    /// Lower display temperature bound in Celsius.
    pub vmin_t: f64,
    /// Upper display temperature bound in Celsius.
    pub vmax_t: f64,
    /// Put the FFC shutter under manual control before recording.
    pub shutter_manual: bool,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            vmin_t: 30.0,
            vmax_t: 34.0,
            shutter_manual: false,
        }
    }
}

impl ThermalConfig {
    /// Display bounds as the camera type expects them.
    pub fn bounds(&self) -> ThermalBounds {
        ThermalBounds {
            vmin_t: self.vmin_t,
            vmax_t: self.vmax_t,
        }
    }
}

/// Vision camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Acquisition frame rate.
    pub frame_rate_fps: f64,
    /// Sensor width in pixels.
    pub width: u32,
    /// Sensor height in pixels.
    pub height: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            frame_rate_fps: 30.0,
            width: 640,
            height: 480,
        }
    }
}

/// Recording bounds and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSection {
    /// Segment duration in seconds; unbounded when absent.
    pub duration_s: Option<f64>,
    /// Segment frame budget; wins over `duration_s` when both are set.
    pub frame_budget: Option<u64>,
    /// Number of preview/record repetitions.
    pub total_rec: u32,
    /// Pause between repetitions in seconds.
    pub buffer_s: f64,
    /// Preview length in seconds before each recording.
    pub preview_s: f64,
    /// Per-frame pull timeout in milliseconds.
    pub grab_timeout_ms: u64,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            duration_s: None,
            frame_budget: None,
            total_rec: 1,
            buffer_s: 0.0,
            preview_s: 0.0,
            grab_timeout_ms: 5000,
        }
    }
}

impl RecordingSection {
    /// Convert to the session's runtime configuration.
    pub fn to_config(&self) -> RecordingConfig {
        RecordingConfig {
            duration_s: self.duration_s,
            frame_budget: self.frame_budget,
            total_rec: self.total_rec,
            buffer_s: self.buffer_s,
            preview_s: self.preview_s,
            grab_timeout: Duration::from_millis(self.grab_timeout_ms),
        }
    }
}

impl Settings {
    /// Load from the default location and `CAMDAQ_` environment overrides.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config/camdaq.toml")
    }

    /// Load from a specific file path plus environment overrides.
    ///
    /// Environment variables override the file with prefix `CAMDAQ_`,
    /// e.g. `CAMDAQ_APPLICATION_LOG_LEVEL=debug`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CAMDAQ_").split("_"))
            .extract()
    }

    /// Validate values the type system cannot.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }
        if self.thermal.vmin_t >= self.thermal.vmax_t {
            return Err(format!(
                "Thermal bounds are inverted: vmin_t {} >= vmax_t {}",
                self.thermal.vmin_t, self.thermal.vmax_t
            ));
        }
        if self.vision.frame_rate_fps <= 0.0 {
            return Err("Vision frame rate must be positive".to_string());
        }
        if self.vision.width == 0 || self.vision.height == 0 {
            return Err("Vision resolution must be non-zero".to_string());
        }
        if self.recording.total_rec == 0 {
            return Err("total_rec must be at least 1".to_string());
        }
        if self.recording.buffer_s < 0.0 || self.recording.preview_s < 0.0 {
            return Err("buffer_s and preview_s cannot be negative".to_string());
        }
        if let Some(duration_s) = self.recording.duration_s {
            if duration_s <= 0.0 {
                return Err("duration_s must be positive when set".to_string());
            }
        }
        if self.recording.grab_timeout_ms == 0 {
            return Err("grab_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            storage: StorageConfig::default(),
            thermal: ThermalConfig::default(),
            vision: VisionConfig::default(),
            recording: RecordingSection::default(),
        }
    }
}
