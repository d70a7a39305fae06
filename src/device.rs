//! Device handle and the vendor-link seam.
//!
//! [`CameraLink`] is the boundary behind which vendor SDKs live: anything
//! that can open a physical camera, stream sample grids, and accept the
//! small set of control commands lab cameras need. The crate ships
//! simulated links (see [`crate::camera::sim`]); SDK-backed links implement
//! the same trait out of tree and are selected once, at handle
//! construction.
//!
//! [`DeviceHandle`] owns exactly one link plus its connection state.
//! Everything the link allocates for streaming (frame queue, reader
//! context) is constructed by `open()` and torn down by `close()`, so no
//! state outlives the handle or leaks across sessions.

use std::time::Duration;

use crate::data::Image;
use crate::error::{AppResult, CamError};

/// Connection state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No hardware reservation held.
    Closed,
    /// Reservation held, stream not running.
    Open,
    /// Stream actively producing frames.
    Streaming,
}

/// Capture parameters pushed to a link before streaming starts.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Requested frame rate in frames per second.
    pub frame_rate_fps: f64,
    /// Sensor width in pixels.
    pub width: u32,
    /// Sensor height in pixels.
    pub height: u32,
}

/// Control commands a camera link may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraControl {
    /// Switch the flat-field-correction shutter to manual operation.
    ShutterManual,
    /// Switch the flat-field-correction shutter back to automatic.
    ShutterAuto,
    /// Run a one-shot flat-field correction.
    FlatFieldCorrection,
    /// Select the high-gain sensor mode.
    GainHigh,
}

/// Outcome of a single frame pull.
///
/// Callers branch on an explicit result instead of catching exceptions:
/// a `Timeout` is a missing frame (the session substitutes a placeholder),
/// a `Fault` is a device-level error that aborts the session.
#[derive(Debug)]
pub enum Grab {
    /// A decoded sample grid.
    Image(Image),
    /// No frame arrived within the timeout.
    Timeout,
    /// The device failed in a way a retry will not fix.
    Fault(CamError),
}

/// Identity of the hardware behind a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Human-readable model or driver name.
    pub model: String,
    /// Serial number or bus address when known.
    pub serial: Option<String>,
}

/// The vendor-SDK-facing transport a [`DeviceHandle`] owns.
pub trait CameraLink: Send {
    /// Identity of the device this link talks to.
    fn info(&self) -> LinkInfo;

    /// Acquire the physical device. Called once per reservation.
    fn open(&mut self) -> AppResult<()>;

    /// Push capture parameters. Only valid between `open` and
    /// `start_stream`.
    fn configure(&mut self, cfg: &CaptureConfig) -> AppResult<()>;

    /// Transition the device into an actively-producing state.
    fn start_stream(&mut self) -> AppResult<()>;

    /// Block up to `timeout` for the next sample grid.
    fn recv_frame(&mut self, timeout: Duration) -> Grab;

    /// Issue a control command. Links that do not support a command
    /// return a `DeviceFault`.
    fn control(&mut self, ctl: CameraControl) -> AppResult<()>;

    /// Leave the producing state. Must be safe to call when streaming
    /// never started.
    fn stop_stream(&mut self);

    /// Release the hardware and every resource streaming allocated.
    /// Must be idempotent.
    fn close(&mut self);
}

/// Owns one camera device for the duration of a reservation.
///
/// Exactly one physical reservation is held between a successful `open()`
/// and `close()`. The handle is exclusively owned by one recording session
/// at a time; re-opening an already-open handle is a usage error.
pub struct DeviceHandle {
    link: Box<dyn CameraLink>,
    state: ConnectionState,
}

impl DeviceHandle {
    /// Wrap a link. The device stays closed until `open()`.
    pub fn new(link: Box<dyn CameraLink>) -> Self {
        Self {
            link,
            state: ConnectionState::Closed,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Identity of the underlying device.
    pub fn info(&self) -> LinkInfo {
        self.link.info()
    }

    /// Attempt to acquire the device once.
    pub fn open(&mut self) -> AppResult<()> {
        if self.state != ConnectionState::Closed {
            return Err(CamError::AlreadyOpen);
        }
        self.link.open()?;
        self.state = ConnectionState::Open;
        tracing::info!(model = %self.link.info().model, "camera opened");
        Ok(())
    }

    /// Acquire the device, re-attempting while `keep_trying` approves.
    ///
    /// Lab cameras are regularly busy or still warming up; rather than
    /// failing permanently the handle reports the recoverable condition to
    /// the callback (typically an operator prompt) and retries when it
    /// returns `true`. Non-recoverable errors propagate immediately.
    pub fn open_with_retry<F>(&mut self, mut keep_trying: F) -> AppResult<()>
    where
        F: FnMut(&CamError) -> bool,
    {
        loop {
            match self.open() {
                Ok(()) => return Ok(()),
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(error = %err, "camera open failed, asking operator");
                    if !keep_trying(&err) {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Push capture parameters to the link.
    ///
    /// Rejected while streaming; reconfiguring a producing device is a
    /// usage error.
    pub fn configure(&mut self, cfg: &CaptureConfig) -> AppResult<()> {
        match self.state {
            ConnectionState::Closed => Err(CamError::NotOpen),
            ConnectionState::Streaming => Err(CamError::ConfigureWhileStreaming),
            ConnectionState::Open => self.link.configure(cfg),
        }
    }

    /// Start the hardware stream.
    pub fn start_stream(&mut self) -> AppResult<()> {
        match self.state {
            ConnectionState::Closed => Err(CamError::NotOpen),
            ConnectionState::Streaming => Ok(()),
            ConnectionState::Open => {
                self.link.start_stream()?;
                self.state = ConnectionState::Streaming;
                Ok(())
            }
        }
    }

    /// Block up to `timeout` for the next frame.
    pub fn recv_frame(&mut self, timeout: Duration) -> Grab {
        if self.state != ConnectionState::Streaming {
            return Grab::Fault(CamError::NotOpen);
        }
        self.link.recv_frame(timeout)
    }

    /// Issue a control command to the device.
    pub fn control(&mut self, ctl: CameraControl) -> AppResult<()> {
        if self.state == ConnectionState::Closed {
            return Err(CamError::NotOpen);
        }
        self.link.control(ctl)
    }

    /// Stop the hardware stream. No-op when the stream never started.
    pub fn stop_stream(&mut self) {
        if self.state == ConnectionState::Streaming {
            self.link.stop_stream();
            self.state = ConnectionState::Open;
        }
    }

    /// Release the device. Safe to call multiple times.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.stop_stream();
        self.link.close();
        self.state = ConnectionState::Closed;
        tracing::info!(model = %self.link.info().model, "camera closed");
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}
