//! Radiometric thermal camera.
//!
//! The sensor delivers raw counts in centikelvin; this source converts
//! every grid to degrees Celsius before anyone else sees it. Geometry and
//! rate are fixed by the sensor (160x120 at 8.7 fps); the configurable
//! parts are the display temperature bounds and the FFC shutter behavior.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{CameraKind, FrameSource, SourceInfo};
use crate::data::{Image, SampleBuf, SampleFormat};
use crate::device::{CameraControl, CameraLink, ConnectionState, DeviceHandle, Grab};
use crate::error::{AppResult, CamError};

use super::sim::{SimCameraLink, SimLinkConfig};

/// Display temperature bounds in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalBounds {
    /// Lower bound of the rendered range.
    pub vmin_t: f64,
    /// Upper bound of the rendered range.
    pub vmax_t: f64,
}

impl Default for ThermalBounds {
    fn default() -> Self {
        Self {
            vmin_t: 30.0,
            vmax_t: 34.0,
        }
    }
}

/// Thermal camera frame source.
pub struct ThermalCamera {
    handle: DeviceHandle,
    bounds: ThermalBounds,
    width: u32,
    height: u32,
    frame_rate_fps: f64,
    shutter_manual: bool,
}

impl ThermalCamera {
    /// Wrap a link selected at construction time.
    pub fn new(link: Box<dyn CameraLink>, bounds: ThermalBounds) -> Self {
        Self {
            handle: DeviceHandle::new(link),
            bounds,
            width: 160,
            height: 120,
            frame_rate_fps: 8.7,
            shutter_manual: false,
        }
    }

    /// A camera backed by the simulated thermal link.
    pub fn simulated(bounds: ThermalBounds) -> Self {
        Self::new(
            Box::new(SimCameraLink::new(SimLinkConfig::thermal())),
            bounds,
        )
    }

    /// A camera backed by a custom simulated link, for tests.
    pub fn simulated_with(cfg: SimLinkConfig, bounds: ThermalBounds) -> Self {
        let camera = Self::new(Box::new(SimCameraLink::new(cfg.clone())), bounds);
        Self {
            width: cfg.width,
            height: cfg.height,
            frame_rate_fps: cfg.frame_rate_fps,
            ..camera
        }
    }

    /// Acquire the device.
    pub fn open(&mut self) -> AppResult<()> {
        self.handle.open()
    }

    /// Acquire the device, retrying while the operator approves.
    pub fn open_with_retry<F>(&mut self, keep_trying: F) -> AppResult<()>
    where
        F: FnMut(&CamError) -> bool,
    {
        self.handle.open_with_retry(keep_trying)
    }

    /// Release the device. Idempotent.
    pub fn close(&mut self) {
        self.handle.close();
    }

    /// Change the display temperature bounds. Rejected while streaming.
    pub fn set_bounds(&mut self, bounds: ThermalBounds) -> AppResult<()> {
        if self.handle.state() == ConnectionState::Streaming {
            return Err(CamError::ConfigureWhileStreaming);
        }
        if bounds.vmin_t >= bounds.vmax_t {
            return Err(CamError::Configuration(format!(
                "temperature bounds are inverted: vmin_t {} >= vmax_t {}",
                bounds.vmin_t, bounds.vmax_t
            )));
        }
        self.bounds = bounds;
        Ok(())
    }

    /// Current display temperature bounds.
    pub fn bounds(&self) -> ThermalBounds {
        self.bounds
    }

    /// Put the FFC shutter under manual control.
    pub fn set_shutter_manual(&mut self) -> AppResult<()> {
        self.handle.control(CameraControl::ShutterManual)?;
        self.shutter_manual = true;
        tracing::info!("shutter is now manual");
        Ok(())
    }

    /// Run a one-shot flat-field correction.
    pub fn run_ffc(&mut self) -> AppResult<()> {
        tracing::info!("manual flat-field correction");
        self.handle.control(CameraControl::FlatFieldCorrection)
    }

    /// Grab one frame and persist it as a PNG rendered within the display
    /// bounds. Returns the written path.
    pub fn save_still(&mut self, dir: &Path, timeout: Duration) -> AppResult<PathBuf> {
        let image = match self.get_frame(timeout) {
            Grab::Image(image) => image,
            Grab::Timeout => {
                return Err(CamError::DeviceFault(
                    "no frame arrived for the still capture".to_string(),
                ))
            }
            Grab::Fault(err) => return Err(err),
        };
        let stamp = chrono::Local::now().format("day_%d_%m_%Y_time_%H_%M_%S");
        let path = dir.join(format!("{stamp}.png"));
        write_rendered_png(&image, self.bounds, &path)?;
        tracing::info!(path = %path.display(), "thermal still saved");
        Ok(path)
    }
}

impl FrameSource for ThermalCamera {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: CameraKind::Thermal,
            width: self.width,
            height: self.height,
            frame_rate_fps: self.frame_rate_fps,
            temperature_min: Some(self.bounds.vmin_t),
            temperature_max: Some(self.bounds.vmax_t),
            shutter_manual: Some(self.shutter_manual),
        }
    }

    fn start(&mut self) -> AppResult<()> {
        self.handle.start_stream()
    }

    fn get_frame(&mut self, timeout: Duration) -> Grab {
        match self.handle.recv_frame(timeout) {
            Grab::Image(raw) => match decode_celsius(&raw) {
                Some(image) => Grab::Image(image),
                None => {
                    tracing::warn!(
                        format = raw.samples.format().name(),
                        "undecodable thermal frame, treating as missing"
                    );
                    Grab::Timeout
                }
            },
            other => other,
        }
    }

    fn stop(&mut self) {
        self.handle.stop_stream();
    }

    fn placeholder(&self) -> Image {
        Image::blank(self.width, self.height, SampleFormat::Celsius)
    }
}

/// Convert a raw sensor grid to Celsius; `None` when the encoding or the
/// buffer length is wrong.
fn decode_celsius(raw: &Image) -> Option<Image> {
    if !raw.is_consistent() {
        return None;
    }
    match &raw.samples {
        SampleBuf::Mono16(counts) => Some(Image::from_centikelvin(raw.width, raw.height, counts)),
        // Already canonical, pass through (hardware links may convert
        // on-device).
        SampleBuf::Celsius(_) => Some(raw.clone()),
        SampleBuf::Mono8(_) => None,
    }
}

/// Render a Celsius grid to an 8-bit grayscale PNG clamped to `bounds`.
fn write_rendered_png(image: &Image, bounds: ThermalBounds, path: &Path) -> AppResult<()> {
    let SampleBuf::Celsius(values) = &image.samples else {
        return Err(CamError::UnsupportedSampleFormat {
            format: image.samples.format().name(),
            sink: "png still",
        });
    };
    let span = bounds.vmax_t - bounds.vmin_t;
    let pixels: Vec<u8> = values
        .iter()
        .map(|&t| {
            let norm = ((t - bounds.vmin_t) / span).clamp(0.0, 1.0);
            (norm * 255.0).round() as u8
        })
        .collect();
    let buffer: image::GrayImage =
        image::ImageBuffer::from_raw(image.width, image.height, pixels).ok_or_else(|| {
            CamError::Sink("frame dimensions do not match the pixel data".to_string())
        })?;
    buffer
        .save(path)
        .map_err(|e| CamError::Sink(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_sim() -> SimLinkConfig {
        SimLinkConfig {
            frame_rate_fps: 200.0,
            width: 8,
            height: 6,
            seed: Some(11),
            ..SimLinkConfig::thermal()
        }
    }

    #[test]
    fn frames_come_out_in_celsius() {
        let mut cam = ThermalCamera::simulated_with(fast_sim(), ThermalBounds::default());
        cam.open().unwrap();
        cam.start().unwrap();
        match cam.get_frame(Duration::from_millis(200)) {
            Grab::Image(img) => {
                assert!(matches!(img.samples, SampleBuf::Celsius(_)));
                // 30315 centikelvin and up converts to >= 30 Celsius.
                assert!(img.get(0, 0).unwrap() >= 30.0);
                assert!(img.get(0, 0).unwrap() < 40.0);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
        cam.stop();
        cam.close();
    }

    #[test]
    fn stop_without_start_does_not_panic() {
        let mut cam = ThermalCamera::simulated(ThermalBounds::default());
        cam.stop();
    }

    #[test]
    fn bounds_validation_rejects_inverted_range() {
        let mut cam = ThermalCamera::simulated(ThermalBounds::default());
        let err = cam
            .set_bounds(ThermalBounds {
                vmin_t: 34.0,
                vmax_t: 30.0,
            })
            .unwrap_err();
        assert!(matches!(err, CamError::Configuration(_)));
    }

    #[test]
    fn placeholder_matches_geometry_and_unit() {
        let cam = ThermalCamera::simulated_with(fast_sim(), ThermalBounds::default());
        let blank = cam.placeholder();
        assert_eq!((blank.width, blank.height), (8, 6));
        assert_eq!(blank.samples.format(), SampleFormat::Celsius);
    }

    #[test]
    fn shutter_control_updates_info() {
        let mut cam = ThermalCamera::simulated_with(fast_sim(), ThermalBounds::default());
        cam.open().unwrap();
        cam.set_shutter_manual().unwrap();
        assert_eq!(cam.info().shutter_manual, Some(true));
        cam.close();
    }

    #[test]
    fn still_renders_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut cam = ThermalCamera::simulated_with(fast_sim(), ThermalBounds::default());
        cam.open().unwrap();
        cam.start().unwrap();
        let path = cam
            .save_still(dir.path(), Duration::from_millis(500))
            .unwrap();
        assert!(path.exists());
        cam.stop();
        cam.close();
    }
}
