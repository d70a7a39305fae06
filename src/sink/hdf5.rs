//! HDF5 per-frame dataset sink (`storage_hdf5` feature).
//!
//! Frame `i` is stored as dataset `frame{i}` (its 2-D grid, Celsius f64 or
//! raw grayscale) and its timestamp as the one-element dataset `time{i}`,
//! 1-indexed, which is the layout downstream analysis scripts expect.

use std::path::Path;

use crate::data::{Frame, SampleBuf};
use crate::error::{AppResult, CamError};
use crate::sink::{FrameSink, SinkInfo};

/// Self-describing per-frame dataset container.
pub struct DatasetSink {
    file: Option<hdf5::File>,
    output_file: String,
    frames_written: u64,
}

impl std::fmt::Debug for DatasetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetSink")
            .field("output_file", &self.output_file)
            .field("frames_written", &self.frames_written)
            .field("open", &self.file.is_some())
            .finish()
    }
}

impl DatasetSink {
    /// Create (or truncate) the container at `path`.
    pub fn create(path: &Path) -> AppResult<Self> {
        let output_file = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or(CamError::OutputNotSet)?
            .to_string();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = hdf5::File::create(path)
            .map_err(|e| CamError::Sink(format!("failed to create {}: {e}", path.display())))?;
        Ok(Self {
            file: Some(file),
            output_file,
            frames_written: 0,
        })
    }
}

impl FrameSink for DatasetSink {
    fn append(&mut self, frame: &Frame) -> AppResult<()> {
        let Some(file) = self.file.as_ref() else {
            return Err(CamError::Sink("sink already finalized".to_string()));
        };
        if !frame.image.is_consistent() {
            return Err(CamError::Sink(format!(
                "frame {} data does not match {}x{}",
                frame.seq, frame.image.width, frame.image.height
            )));
        }

        let shape = (frame.image.height as usize, frame.image.width as usize);
        let frame_name = format!("frame{}", frame.seq);
        let time_name = format!("time{}", frame.seq);

        let write = |err| CamError::Sink(format!("failed to write {frame_name}: {err}"));
        match &frame.image.samples {
            SampleBuf::Celsius(values) => file
                .new_dataset::<f64>()
                .shape(shape)
                .create(frame_name.as_str())
                .and_then(|ds| ds.write_raw(values.as_slice()))
                .map_err(write)?,
            SampleBuf::Mono16(values) => file
                .new_dataset::<u16>()
                .shape(shape)
                .create(frame_name.as_str())
                .and_then(|ds| ds.write_raw(values.as_slice()))
                .map_err(write)?,
            SampleBuf::Mono8(values) => file
                .new_dataset::<u8>()
                .shape(shape)
                .create(frame_name.as_str())
                .and_then(|ds| ds.write_raw(values.as_slice()))
                .map_err(write)?,
        }

        file.new_dataset::<f64>()
            .shape(1)
            .create(time_name.as_str())
            .and_then(|ds| ds.write_raw(&[frame.elapsed_s]))
            .map_err(|e| CamError::Sink(format!("failed to write {time_name}: {e}")))?;

        self.frames_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        // Dropping the handle flushes and closes the file.
        self.file.take();
        tracing::debug!(
            frames = self.frames_written,
            file = %self.output_file,
            "dataset sink finalized"
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            output_file: self.output_file.clone(),
            video_format: "hdf5",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Image;
    use tempfile::TempDir;

    fn celsius_frame(seq: u64, elapsed_s: f64) -> Frame {
        Frame {
            seq,
            elapsed_s,
            image: Image::from_centikelvin(4, 3, &[30315 + seq as u16; 12]),
        }
    }

    #[test]
    fn datasets_are_one_indexed_pairs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rec.hdf5");
        let mut sink = DatasetSink::create(&path).unwrap();
        sink.append(&celsius_frame(1, 0.0)).unwrap();
        sink.append(&celsius_frame(2, 0.115)).unwrap();
        sink.finalize().unwrap();

        let file = hdf5::File::open(&path).unwrap();
        assert!(file.dataset("frame1").is_ok());
        assert!(file.dataset("time1").is_ok());
        assert!(file.dataset("frame2").is_ok());
        assert!(file.dataset("time2").is_ok());
        assert!(file.dataset("frame3").is_err());

        let times: Vec<f64> = file.dataset("time2").unwrap().read_raw().unwrap();
        assert_eq!(times, vec![0.115]);
    }

    #[test]
    fn append_after_finalize_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut sink = DatasetSink::create(&dir.path().join("done.hdf5")).unwrap();
        sink.finalize().unwrap();
        assert!(sink.append(&celsius_frame(1, 0.0)).is_err());
    }
}
