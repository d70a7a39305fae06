//! Frame sources.
//!
//! A frame source sits on top of a [`crate::device::DeviceHandle`] and
//! turns vendor-native sample grids into the canonical representation for
//! its camera kind: degrees Celsius for the thermal sensor, grayscale
//! planes for the vision camera. The recording session only ever sees the
//! [`FrameSource`] trait.

pub mod sim;
pub mod thermal;
pub mod vision;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::Image;
use crate::device::Grab;
use crate::error::AppResult;

/// The camera families this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Radiometric thermal sensor (fixed 160x120 @ 8.7 fps).
    Thermal,
    /// Machine-vision grayscale camera.
    Vision,
}

impl std::fmt::Display for CameraKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraKind::Thermal => f.write_str("thermal"),
            CameraKind::Vision => f.write_str("vision"),
        }
    }
}

/// Descriptive snapshot of a source, used by the metadata writer.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Camera family.
    pub kind: CameraKind,
    /// Sensor width in pixels.
    pub width: u32,
    /// Sensor height in pixels.
    pub height: u32,
    /// Configured frame rate.
    pub frame_rate_fps: f64,
    /// Lower display temperature bound, thermal only.
    pub temperature_min: Option<f64>,
    /// Upper display temperature bound, thermal only.
    pub temperature_max: Option<f64>,
    /// Whether the FFC shutter is under manual control, thermal only.
    pub shutter_manual: Option<bool>,
}

/// A configured camera able to produce canonical frames.
///
/// `start` transitions the device into the producing state, `get_frame`
/// blocks up to its timeout for one decoded grid, `stop` leaves the
/// producing state and is safe to call even when `start` never succeeded.
pub trait FrameSource {
    /// Descriptive snapshot for metadata and sink selection.
    fn info(&self) -> SourceInfo;

    /// Begin producing frames.
    fn start(&mut self) -> AppResult<()>;

    /// Pull the next frame, blocking up to `timeout`.
    ///
    /// A decode failure is reported as [`Grab::Timeout`]: the frame is
    /// missing, not fatal.
    fn get_frame(&mut self, timeout: Duration) -> Grab;

    /// Leave the producing state.
    fn stop(&mut self);

    /// An empty grid matching this source's geometry and sample format,
    /// substituted for frames that could not be retrieved in time.
    fn placeholder(&self) -> Image;
}
