//! # camdaq
//!
//! Camera acquisition and timestamped recording for laboratory
//! experiments. The crate drives a radiometric thermal sensor and a
//! machine-vision grayscale camera through one repeatable protocol:
//! open device, configure, stream, capture with timestamps, persist,
//! close.
//!
//! ## Crate Structure
//!
//! - **`camera`**: the [`camera::FrameSource`] trait and the concrete
//!   thermal/vision cameras, plus the simulated links used without
//!   hardware.
//! - **`config`**: strongly-typed settings loaded from TOML and
//!   environment variables. See [`config::Settings`].
//! - **`data`**: frame and sample-grid types, including the canonical
//!   centikelvin-to-Celsius conversion.
//! - **`device`**: the [`device::DeviceHandle`] owning one camera link,
//!   with retrying open and idempotent close.
//! - **`error`**: the crate-wide [`error::CamError`] and its
//!   recoverability taxonomy.
//! - **`logging`**: tracing setup, console plus the optional append-only
//!   error log.
//! - **`metadata`**: write-once JSON records describing each recording
//!   segment and the run as a whole.
//! - **`session`**: the recording state machine: preview, capture,
//!   repetition, finalize.
//! - **`sink`**: output containers (TIFF stack, HDF5 per-frame datasets)
//!   and the CSV timestamp log.
//!
//! ## A minimal recording
//!
//! ```no_run
//! use camdaq::camera::thermal::{ThermalBounds, ThermalCamera};
//! use camdaq::session::{RecordingConfig, RecordingSession, SessionPaths};
//! use camdaq::sink::SinkKind;
//!
//! # fn main() -> Result<(), camdaq::error::CamError> {
//! let mut camera = ThermalCamera::simulated(ThermalBounds::default());
//! camera.open()?;
//!
//! let paths = SessionPaths {
//!     dir: "data".into(),
//!     base_name: "thermal-camera".to_string(),
//!     tag: "subject42".to_string(),
//! };
//! let config = RecordingConfig {
//!     duration_s: Some(10.0),
//!     ..RecordingConfig::default()
//! };
//! let mut session =
//!     RecordingSession::new(Box::new(camera), SinkKind::Hdf5Dataset, paths, config);
//! let record = session.run("pilot")?;
//! println!("captured {} segment(s)", record.segments.len());
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod session;
pub mod sink;
