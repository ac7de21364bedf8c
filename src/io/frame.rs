//! Decoded pixel buffers and timestamped frames.

use std::fmt;

/// Which input stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Color,
    Depth,
}

impl Modality {
    /// The opposite stream.
    pub fn other(self) -> Self {
        match self {
            Modality::Color => Modality::Depth,
            Modality::Depth => Modality::Color,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Color => write!(f, "color"),
            Modality::Depth => write!(f, "depth"),
        }
    }
}

/// In-memory pixel layout.
///
/// Multi-byte encodings are stored in native endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Mono8,
    /// 16-bit depth (millimetres or dataset-specific scale).
    Depth16,
    /// 32-bit float depth in metres.
    Depth32F,
}

impl PixelEncoding {
    /// Parse a sensor_msgs/Image encoding string.
    pub fn from_ros(encoding: &str) -> Option<Self> {
        match encoding {
            "rgb8" => Some(Self::Rgb8),
            "bgr8" => Some(Self::Bgr8),
            "rgba8" => Some(Self::Rgba8),
            "bgra8" => Some(Self::Bgra8),
            "mono8" | "8UC1" => Some(Self::Mono8),
            "mono16" | "16UC1" => Some(Self::Depth16),
            "32FC1" => Some(Self::Depth32F),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Depth16 => 2,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 | Self::Depth32F => 4,
        }
    }

    /// Size of one channel sample, used for endianness swaps.
    pub fn sample_bytes(self) -> usize {
        match self {
            Self::Depth16 => 2,
            Self::Depth32F => 4,
            _ => 1,
        }
    }

    /// Whether a stream of the given modality may carry this encoding.
    pub fn fits(self, modality: Modality) -> bool {
        match modality {
            Modality::Color => matches!(
                self,
                Self::Rgb8 | Self::Bgr8 | Self::Rgba8 | Self::Bgra8 | Self::Mono8
            ),
            Modality::Depth => matches!(self, Self::Depth16 | Self::Depth32F),
        }
    }
}

/// Tightly packed 2D pixel buffer (no row padding).
#[derive(Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.encoding.bytes_per_pixel()
    }

    /// Raw depth value at (x, y), `None` for color buffers or out of bounds.
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride() + x as usize * self.encoding.bytes_per_pixel();
        match self.encoding {
            PixelEncoding::Depth16 => {
                let bytes = [self.data[idx], self.data[idx + 1]];
                Some(u16::from_ne_bytes(bytes) as f32)
            }
            PixelEncoding::Depth32F => {
                let bytes = [
                    self.data[idx],
                    self.data[idx + 1],
                    self.data[idx + 2],
                    self.data[idx + 3],
                ];
                Some(f32::from_ne_bytes(bytes))
            }
            _ => None,
        }
    }

    /// Convert to an OpenCV `Mat` (copies the data).
    #[cfg(feature = "opencv")]
    pub fn to_mat(&self) -> opencv::Result<opencv::core::Mat> {
        use opencv::core::{CV_8UC1, CV_8UC3, CV_8UC4, CV_16UC1, CV_32FC1, Mat, Scalar};
        use opencv::prelude::*;

        let typ = match self.encoding {
            PixelEncoding::Mono8 => CV_8UC1,
            PixelEncoding::Rgb8 | PixelEncoding::Bgr8 => CV_8UC3,
            PixelEncoding::Rgba8 | PixelEncoding::Bgra8 => CV_8UC4,
            PixelEncoding::Depth16 => CV_16UC1,
            PixelEncoding::Depth32F => CV_32FC1,
        };
        let mut mat = Mat::new_rows_cols_with_default(
            self.height as i32,
            self.width as i32,
            typ,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(&self.data);
        Ok(mat)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A decoded frame from one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedFrame {
    pub capture_time_ns: u64,
    pub modality: Modality,
    pub pixels: PixelBuffer,
}
