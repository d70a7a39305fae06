//! Frame and sample-grid types.
//!
//! A camera link yields [`Image`]s in whatever sample encoding the sensor
//! produces; the frame source converts them to the canonical unit for its
//! camera kind (Celsius for thermal sensors, grayscale planes for vision
//! sensors). The recording session then tags each image with a sequence
//! number and a session-relative timestamp, producing an immutable
//! [`Frame`].

/// Sample encoding of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 8-bit grayscale, one byte per pixel.
    Mono8,
    /// 16-bit values, used both for grayscale planes and for raw sensor
    /// counts (e.g. centikelvin) before conversion.
    Mono16,
    /// Temperature in degrees Celsius, one f64 per pixel.
    Celsius,
}

impl SampleFormat {
    /// Short name used in error messages and metadata.
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Mono8 => "mono8",
            SampleFormat::Mono16 => "mono16",
            SampleFormat::Celsius => "celsius",
        }
    }
}

/// Pixel payload of an [`Image`], row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuf {
    Mono8(Vec<u8>),
    Mono16(Vec<u16>),
    Celsius(Vec<f64>),
}

impl SampleBuf {
    /// Number of samples in the buffer.
    pub fn len(&self) -> usize {
        match self {
            SampleBuf::Mono8(v) => v.len(),
            SampleBuf::Mono16(v) => v.len(),
            SampleBuf::Celsius(v) => v.len(),
        }
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoding of this buffer.
    pub fn format(&self) -> SampleFormat {
        match self {
            SampleBuf::Mono8(_) => SampleFormat::Mono8,
            SampleBuf::Mono16(_) => SampleFormat::Mono16,
            SampleBuf::Celsius(_) => SampleFormat::Celsius,
        }
    }
}

/// Offset applied when converting raw thermal counts (centikelvin) to
/// degrees Celsius: `celsius = (raw - 27315) / 100`.
pub const CENTIKELVIN_OFFSET: f64 = 27315.0;

/// A single 2-D sample grid captured from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major pixel data.
    pub samples: SampleBuf,
}

impl Image {
    /// Create an image from 8-bit grayscale data.
    pub fn from_mono8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            samples: SampleBuf::Mono8(data),
        }
    }

    /// Create an image from 16-bit data (grayscale plane or raw counts).
    pub fn from_mono16(width: u32, height: u32, data: Vec<u16>) -> Self {
        Self {
            width,
            height,
            samples: SampleBuf::Mono16(data),
        }
    }

    /// Convert raw centikelvin sensor counts into a Celsius image.
    ///
    /// The transform is the fixed linear map `(raw - 27315) / 100`, applied
    /// in f64 so no precision beyond the 16-bit source is lost.
    pub fn from_centikelvin(width: u32, height: u32, raw: &[u16]) -> Self {
        let celsius = raw
            .iter()
            .map(|&c| (f64::from(c) - CENTIKELVIN_OFFSET) / 100.0)
            .collect();
        Self {
            width,
            height,
            samples: SampleBuf::Celsius(celsius),
        }
    }

    /// An all-zero image, used as a placeholder when a frame could not be
    /// retrieved in time.
    pub fn blank(width: u32, height: u32, format: SampleFormat) -> Self {
        let n = (width as usize) * (height as usize);
        let samples = match format {
            SampleFormat::Mono8 => SampleBuf::Mono8(vec![0; n]),
            SampleFormat::Mono16 => SampleBuf::Mono16(vec![0; n]),
            SampleFormat::Celsius => SampleBuf::Celsius(vec![0.0; n]),
        };
        Self {
            width,
            height,
            samples,
        }
    }

    /// Whether the buffer length matches `width * height`.
    pub fn is_consistent(&self) -> bool {
        self.samples.len() == (self.width as usize) * (self.height as usize)
    }

    /// Sample value at (x, y) as f64, or `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) as usize;
        match &self.samples {
            SampleBuf::Mono8(v) => v.get(idx).map(|&s| f64::from(s)),
            SampleBuf::Mono16(v) => v.get(idx).map(|&s| f64::from(s)),
            SampleBuf::Celsius(v) => v.get(idx).copied(),
        }
    }

    /// Mean sample value, 0.0 for an empty image.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = match &self.samples {
            SampleBuf::Mono8(v) => v.iter().map(|&s| f64::from(s)).sum(),
            SampleBuf::Mono16(v) => v.iter().map(|&s| f64::from(s)).sum(),
            SampleBuf::Celsius(v) => v.iter().sum(),
        };
        sum / self.samples.len() as f64
    }
}

/// One timestamped capture within a recording segment.
///
/// Sequence numbers are contiguous starting at 1; `elapsed_s` is measured
/// from the segment's start on a monotonic clock. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 1-based position within the segment.
    pub seq: u64,
    /// Seconds since the segment started.
    pub elapsed_s: f64,
    /// The captured sample grid.
    pub image: Image,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centikelvin_conversion_matches_fixed_transform() {
        // 30315 centikelvin is exactly 30.0 degrees Celsius.
        let img = Image::from_centikelvin(2, 1, &[30315, 27315]);
        assert_eq!(img.get(0, 0), Some(30.0));
        assert_eq!(img.get(1, 0), Some(0.0));
    }

    #[test]
    fn conversion_preserves_source_precision() {
        // Every representable raw count maps to a distinct Celsius value.
        let img = Image::from_centikelvin(2, 1, &[30315, 30316]);
        let a = img.get(0, 0).unwrap();
        let b = img.get(1, 0).unwrap();
        assert!((b - a - 0.01).abs() < 1e-12);
    }

    #[test]
    fn blank_image_is_consistent_and_zero() {
        let img = Image::blank(160, 120, SampleFormat::Celsius);
        assert!(img.is_consistent());
        assert_eq!(img.mean(), 0.0);
        assert_eq!(img.samples.len(), 160 * 120);
    }

    #[test]
    fn get_rejects_out_of_bounds() {
        let img = Image::from_mono8(4, 4, vec![7; 16]);
        assert_eq!(img.get(3, 3), Some(7.0));
        assert_eq!(img.get(4, 0), None);
        assert_eq!(img.get(0, 4), None);
    }

    #[test]
    fn mean_over_mono16() {
        let img = Image::from_mono16(2, 2, vec![0, 10, 20, 30]);
        assert_eq!(img.mean(), 15.0);
    }
}
