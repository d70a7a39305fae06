//! Output sinks.
//!
//! A sink receives captured frames in arrival order and persists them:
//! either a TIFF image stack (one grayscale file per frame, the visual
//! path) or an HDF5 per-frame dataset container (the thermal path, behind
//! the `storage_hdf5` feature). The per-frame timestamp log lives in
//! [`timestamps`] and is always written alongside whichever sink is in
//! use.

pub mod tiff;
pub mod timestamps;

#[cfg(feature = "storage_hdf5")]
pub mod hdf5;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::error::AppResult;

/// Which sink implementation a recording uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkKind {
    /// Numbered grayscale TIFF files, one per frame.
    #[serde(rename = "tiff")]
    TiffStack,
    /// HDF5 file holding `frame{i}` / `time{i}` datasets.
    #[serde(rename = "hdf5")]
    Hdf5Dataset,
}

impl SinkKind {
    /// File extension of the sink's output path.
    pub fn extension(self) -> &'static str {
        match self {
            SinkKind::TiffStack => "tiff",
            SinkKind::Hdf5Dataset => "hdf5",
        }
    }
}

/// Descriptive snapshot of an open sink, used by the metadata writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkInfo {
    /// File name (not path) the recording was directed to.
    pub output_file: String,
    /// Container format tag recorded in metadata.
    pub video_format: &'static str,
}

/// A persisted container receiving frames in arrival order.
pub trait FrameSink: std::fmt::Debug {
    /// Append one frame. Frames arrive with contiguous sequence numbers.
    fn append(&mut self, frame: &Frame) -> AppResult<()>;

    /// Flush and close the container. Called exactly once per segment.
    fn finalize(&mut self) -> AppResult<()>;

    /// Number of frames appended so far.
    fn frames_written(&self) -> u64;

    /// Descriptive snapshot for metadata.
    fn info(&self) -> SinkInfo;
}

/// Open the sink for a recording segment.
///
/// The HDF5 sink requires the `storage_hdf5` feature; without it the
/// request is rejected up front so no partial output is created.
pub fn open_sink(kind: SinkKind, path: &Path) -> AppResult<Box<dyn FrameSink>> {
    match kind {
        SinkKind::TiffStack => Ok(Box::new(tiff::TiffStackSink::create(path)?)),
        #[cfg(feature = "storage_hdf5")]
        SinkKind::Hdf5Dataset => Ok(Box::new(hdf5::DatasetSink::create(path)?)),
        #[cfg(not(feature = "storage_hdf5"))]
        SinkKind::Hdf5Dataset => Err(crate::error::CamError::FeatureNotEnabled("storage_hdf5")),
    }
}
