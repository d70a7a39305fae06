//! Machine-vision grayscale camera.
//!
//! Unlike the thermal sensor, geometry and frame rate are negotiable here:
//! the frame rate must be pushed to the device before streaming starts,
//! mirroring the acquisition-rate-enable dance real vision cameras
//! require. Grids pass through as grayscale planes; no unit conversion is
//! needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{CameraKind, FrameSource, SourceInfo};
use crate::data::{Image, SampleBuf, SampleFormat};
use crate::device::{CameraLink, CaptureConfig, ConnectionState, DeviceHandle, Grab};
use crate::error::{AppResult, CamError};

use super::sim::{SimCameraLink, SimLinkConfig};

/// Vision camera frame source.
pub struct VisionCamera {
    handle: DeviceHandle,
    width: u32,
    height: u32,
    frame_rate_fps: f64,
    rate_pushed: bool,
}

impl VisionCamera {
    /// Wrap a link selected at construction time.
    pub fn new(link: Box<dyn CameraLink>, width: u32, height: u32) -> Self {
        Self {
            handle: DeviceHandle::new(link),
            width,
            height,
            frame_rate_fps: 30.0,
            rate_pushed: false,
        }
    }

    /// A camera backed by the simulated mono link.
    pub fn simulated() -> Self {
        let cfg = SimLinkConfig::vision();
        Self::simulated_with(cfg)
    }

    /// A camera backed by a custom simulated link, for tests.
    pub fn simulated_with(cfg: SimLinkConfig) -> Self {
        let mut camera = Self::new(
            Box::new(SimCameraLink::new(cfg.clone())),
            cfg.width,
            cfg.height,
        );
        camera.frame_rate_fps = cfg.frame_rate_fps;
        camera
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

    /// Set the acquisition frame rate and push it to the device.
    /// Rejected while streaming.
    pub fn set_frame_rate(&mut self, frames_per_second: f64) -> AppResult<()> {
        if self.handle.state() == ConnectionState::Streaming {
            return Err(CamError::ConfigureWhileStreaming);
        }
        if frames_per_second <= 0.0 {
            return Err(CamError::Configuration(
                "frame rate must be positive".to_string(),
            ));
        }
        self.handle.configure(&CaptureConfig {
            frame_rate_fps: frames_per_second,
            width: self.width,
            height: self.height,
        })?;
        self.frame_rate_fps = frames_per_second;
        self.rate_pushed = true;
        Ok(())
    }

    /// Grab one frame and persist it as a grayscale PNG. Returns the
    /// written path.
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
        let pixels = match image.samples {
            SampleBuf::Mono8(pixels) => pixels,
            other => {
                return Err(CamError::UnsupportedSampleFormat {
                    format: other.format().name(),
                    sink: "png still",
                })
            }
        };
        let stamp = chrono::Local::now().format("day_%d_%m_%Y_time_%H_%M_%S");
        let path = dir.join(format!("{stamp}.png"));
        let buffer: image::GrayImage =
            image::ImageBuffer::from_raw(image.width, image.height, pixels).ok_or_else(|| {
                CamError::Sink("frame dimensions do not match the pixel data".to_string())
            })?;
        buffer
            .save(&path)
            .map_err(|e| CamError::Sink(format!("failed to write {}: {e}", path.display())))?;
        Ok(path)
    }
}

impl FrameSource for VisionCamera {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: CameraKind::Vision,
            width: self.width,
            height: self.height,
            frame_rate_fps: self.frame_rate_fps,
            temperature_min: None,
            temperature_max: None,
            shutter_manual: None,
        }
    }

    fn start(&mut self) -> AppResult<()> {
        self.handle.start_stream()
    }

    fn get_frame(&mut self, timeout: Duration) -> Grab {
        match self.handle.recv_frame(timeout) {
            Grab::Image(image) => {
                let decodable = image.is_consistent()
                    && matches!(
                        image.samples,
                        SampleBuf::Mono8(_) | SampleBuf::Mono16(_)
                    );
                if decodable {
                    Grab::Image(image)
                } else {
                    tracing::warn!(
                        format = image.samples.format().name(),
                        "undecodable vision frame, treating as missing"
                    );
                    Grab::Timeout
                }
            }
            other => other,
        }
    }

    fn stop(&mut self) {
        self.handle.stop_stream();
    }

    fn placeholder(&self) -> Image {
        Image::blank(self.width, self.height, SampleFormat::Mono8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_sim() -> SimLinkConfig {
        SimLinkConfig {
            frame_rate_fps: 200.0,
            width: 16,
            height: 12,
            seed: Some(3),
            ..SimLinkConfig::vision()
        }
    }

    #[test]
    fn frames_pass_through_as_grayscale() {
        let mut cam = VisionCamera::simulated_with(fast_sim());
        cam.open().unwrap();
        cam.set_frame_rate(200.0).unwrap();
        cam.start().unwrap();
        match cam.get_frame(Duration::from_millis(200)) {
            Grab::Image(img) => {
                assert_eq!((img.width, img.height), (16, 12));
                assert!(matches!(img.samples, SampleBuf::Mono8(_)));
            }
            other => panic!("expected a frame, got {other:?}"),
        }
        cam.stop();
        cam.close();
    }

    #[test]
    fn frame_rate_must_be_set_before_streaming() {
        let mut cam = VisionCamera::simulated_with(fast_sim());
        cam.open().unwrap();
        cam.start().unwrap();
        assert!(matches!(
            cam.set_frame_rate(60.0),
            Err(CamError::ConfigureWhileStreaming)
        ));
        cam.stop();
        // Allowed again once the stream is down.
        cam.set_frame_rate(60.0).unwrap();
        assert_eq!(cam.info().frame_rate_fps, 60.0);
        cam.close();
    }

    #[test]
    fn stop_without_start_does_not_panic() {
        let mut cam = VisionCamera::simulated();
        cam.stop();
    }

    #[test]
    fn info_has_no_thermal_fields() {
        let cam = VisionCamera::simulated_with(fast_sim());
        let info = cam.info();
        assert_eq!(info.kind, CameraKind::Vision);
        assert!(info.temperature_min.is_none());
        assert!(info.shutter_manual.is_none());
    }
}
