//! Wire-level image messages as they arrive on the two input streams.

/// One encoded image with its capture stamp.
///
/// `Raw` mirrors the sensor_msgs/Image layout, `Compressed` carries a
/// PNG/JPEG payload (sensor_msgs/CompressedImage, or a dataset file).
#[derive(Debug, Clone)]
pub enum ImageMsg {
    Raw {
        stamp_ns: u64,
        width: u32,
        height: u32,
        encoding: String,
        is_bigendian: bool,
        /// Row length in bytes, including padding.
        step: u32,
        data: Vec<u8>,
    },
    Compressed {
        stamp_ns: u64,
        /// Informational ("png", "jpeg"); the codec is sniffed from the payload.
        format: String,
        data: Vec<u8>,
    },
}

impl ImageMsg {
    pub fn stamp_ns(&self) -> u64 {
        match self {
            ImageMsg::Raw { stamp_ns, .. } | ImageMsg::Compressed { stamp_ns, .. } => *stamp_ns,
        }
    }

    /// Tightly packed raw message (step = width * bytes per pixel, saturating).
    pub fn raw(stamp_ns: u64, width: u32, height: u32, encoding: &str, data: Vec<u8>) -> Self {
        let bpp = crate::io::frame::PixelEncoding::from_ros(encoding)
            .map(|e| e.bytes_per_pixel())
            .unwrap_or(1);
        ImageMsg::Raw {
            stamp_ns,
            width,
            height,
            encoding: encoding.to_string(),
            is_bigendian: cfg!(target_endian = "big"),
            step: width.saturating_mul(bpp as u32),
            data,
        }
    }
}
