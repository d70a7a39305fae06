//! Per-frame timestamp log.
//!
//! A CSV file with the single header `timestamp` and one row per captured
//! frame, in seconds relative to the segment start. The file handle is
//! opened when the segment starts and flushed/closed at finalize, so the
//! log and the output sink always advance together.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppResult;

/// Append-per-frame CSV timestamp log.
pub struct TimestampLog {
    writer: Option<csv::Writer<File>>,
    path: PathBuf,
    rows: u64,
}

impl TimestampLog {
    /// Create the log and write its header.
    pub fn create(path: &Path) -> AppResult<Self> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["timestamp"])?;
        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Append one session-relative timestamp in seconds.
    pub fn append(&mut self, elapsed_s: f64) -> AppResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record([format!("{elapsed_s:.6}")])?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Rows written so far (header excluded).
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the log. Further appends are silently ignored.
    pub fn finalize(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Read every timestamp row back, for verification and analysis tooling.
pub fn read_timestamps(path: &Path) -> AppResult<Vec<f64>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(field) = record.get(0) {
            if let Ok(v) = field.parse::<f64>() {
                values.push(v);
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn header_then_one_row_per_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rec_timestamps.csv");
        let mut log = TimestampLog::create(&path).unwrap();
        log.append(0.0).unwrap();
        log.append(0.5).unwrap();
        log.append(1.0).unwrap();
        log.finalize().unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some("timestamp"));
        assert_eq!(lines.clone().count(), 3);

        let values = read_timestamps(&path).unwrap();
        assert_eq!(values, vec![0.0, 0.5, 1.0]);
        assert_eq!(log.rows(), 3);
    }

    #[test]
    fn append_after_finalize_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("closed.csv");
        let mut log = TimestampLog::create(&path).unwrap();
        log.append(0.1).unwrap();
        log.finalize().unwrap();
        log.append(0.2).unwrap();
        assert_eq!(log.rows(), 1);
        assert_eq!(read_timestamps(&path).unwrap().len(), 1);
    }
}
