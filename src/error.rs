//! Custom error types for the application.
//!
//! This module defines the primary error type, `CamError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures an acquisition
//! run can hit, from configuration and file I/O issues to device-level
//! problems.
//!
//! ## Error Taxonomy
//!
//! Errors fall into four groups, each handled at a different scope:
//!
//! - **Device unavailable** (`DeviceUnavailable`): the camera is absent,
//!   busy, or still warming up. Recoverable; `DeviceHandle::open_with_retry`
//!   re-attempts after operator intervention.
//! - **Frame-level failures**: a single timeout or decode failure never
//!   surfaces as a `CamError` at all; it becomes [`crate::device::Grab::Timeout`]
//!   and the session substitutes a placeholder frame.
//! - **Persist failures** (`Io`, `Csv`, `Metadata`, `Sink`): logged at the
//!   smallest possible scope; the affected entry is lost but the session
//!   keeps capturing.
//! - **Usage errors** (`AlreadyOpen`, `NotOpen`, `ConfigureWhileStreaming`,
//!   `OutputNotSet`, `UnsupportedSampleFormat`): fatal to the current
//!   operation, reported immediately, never corrupt persisted data.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CamError>;

#[derive(Error, Debug)]
pub enum CamError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timestamp log error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device fault: {0}")]
    DeviceFault(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("Device is already open")]
    AlreadyOpen,

    #[error("Capture parameters cannot change while streaming")]
    ConfigureWhileStreaming,

    #[error("Output file is not set")]
    OutputNotSet,

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("{format} frames are not supported by the {sink} sink")]
    UnsupportedSampleFormat {
        format: &'static str,
        sink: &'static str,
    },

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(&'static str),
}

impl CamError {
    /// Whether the condition is worth re-attempting after operator
    /// intervention (camera warming up, held by another process, ...).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CamError::DeviceUnavailable(_))
    }

    /// Whether the error must abort the current recording session.
    ///
    /// Only device-level failures qualify; persist and frame-level errors
    /// are absorbed at a smaller scope.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, CamError::DeviceFault(_) | CamError::NotOpen)
    }
}
