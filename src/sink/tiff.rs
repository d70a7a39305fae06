//! TIFF image-stack sink.
//!
//! Writes one grayscale TIFF per captured frame, numbered by sequence:
//! `base_000001.tiff`, `base_000002.tiff`, ... next to the requested
//! output path. Preserves bit depth (8-bit or 16-bit); thermal Celsius
//! grids belong in the dataset sink, not here.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::tiff::TiffEncoder;
use image::ExtendedColorType;

use crate::data::{Frame, SampleBuf};
use crate::error::{AppResult, CamError};
use crate::sink::{FrameSink, SinkInfo};

/// Image-stack sink for visual frames.
#[derive(Debug)]
pub struct TiffStackSink {
    dir: PathBuf,
    stem: String,
    output_file: String,
    frames_written: u64,
    finalized: bool,
}

impl TiffStackSink {
    /// Prepare a stack rooted at `path` (e.g. `vision-camera_run1.tiff`).
    pub fn create(path: &Path) -> AppResult<Self> {
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or(CamError::OutputNotSet)?
            .to_string();
        let output_file = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or(CamError::OutputNotSet)?
            .to_string();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            stem,
            output_file,
            frames_written: 0,
            finalized: false,
        })
    }

    fn frame_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}_{:06}.tiff", self.stem, seq))
    }
}

impl FrameSink for TiffStackSink {
    fn append(&mut self, frame: &Frame) -> AppResult<()> {
        if self.finalized {
            return Err(CamError::Sink("sink already finalized".to_string()));
        }
        if !frame.image.is_consistent() {
            return Err(CamError::Sink(format!(
                "frame {} data does not match {}x{}",
                frame.seq, frame.image.width, frame.image.height
            )));
        }

        let path = self.frame_path(frame.seq);
        let file = File::create(&path)?;
        let writer = BufWriter::new(file);
        let encoder = TiffEncoder::new(writer);

        let (width, height) = (frame.image.width, frame.image.height);
        let result = match &frame.image.samples {
            SampleBuf::Mono8(data) => {
                encoder.encode(data, width, height, ExtendedColorType::L8)
            }
            SampleBuf::Mono16(data) => {
                let bytes: Vec<u8> = data.iter().flat_map(|&v| v.to_le_bytes()).collect();
                encoder.encode(&bytes, width, height, ExtendedColorType::L16)
            }
            SampleBuf::Celsius(_) => {
                return Err(CamError::UnsupportedSampleFormat {
                    format: "celsius",
                    sink: "tiff stack",
                })
            }
        };
        result.map_err(|e| CamError::Sink(format!("failed to encode {}: {e}", path.display())))?;

        self.frames_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        // Per-frame files are complete on write; nothing buffered remains.
        self.finalized = true;
        tracing::debug!(
            frames = self.frames_written,
            stack = %self.dir.join(&self.output_file).display(),
            "tiff stack finalized"
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            output_file: self.output_file.clone(),
            video_format: "tiff-stack",
        }
    }
}
