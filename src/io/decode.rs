//! Frame decoder: image message -> `TimestampedFrame`.
//!
//! Raw messages are validated and repacked (row padding stripped, multi-byte
//! samples brought to native endianness). Compressed payloads go through the
//! `image` codecs.

use image::DynamicImage;

use crate::error::DecodeError;
use crate::io::frame::{Modality, PixelBuffer, PixelEncoding, TimestampedFrame};
use crate::io::messages::ImageMsg;

/// Decode one message for the given stream.
pub fn decode(msg: &ImageMsg, modality: Modality) -> Result<TimestampedFrame, DecodeError> {
    let pixels = match msg {
        ImageMsg::Raw {
            width,
            height,
            encoding,
            is_bigendian,
            step,
            data,
            ..
        } => decode_raw(*width, *height, encoding, *is_bigendian, *step, data, modality)?,
        ImageMsg::Compressed { data, .. } => decode_compressed(data, modality)?,
    };

    Ok(TimestampedFrame {
        capture_time_ns: msg.stamp_ns(),
        modality,
        pixels,
    })
}

fn decode_raw(
    width: u32,
    height: u32,
    encoding: &str,
    is_bigendian: bool,
    step: u32,
    data: &[u8],
    modality: Modality,
) -> Result<PixelBuffer, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSize { width, height });
    }
    let pixel_encoding = PixelEncoding::from_ros(encoding)
        .ok_or_else(|| DecodeError::UnsupportedEncoding(encoding.to_string()))?;
    if !pixel_encoding.fits(modality) {
        return Err(DecodeError::ModalityMismatch {
            encoding: encoding.to_string(),
            modality,
        });
    }

    let row_bytes = width as usize * pixel_encoding.bytes_per_pixel();
    if (step as usize) < row_bytes {
        return Err(DecodeError::BadStep {
            step,
            min: row_bytes,
        });
    }
    let expected = step as usize * height as usize;
    if data.len() < expected {
        return Err(DecodeError::ShortBuffer {
            expected,
            actual: data.len(),
        });
    }

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks_exact(step as usize).take(height as usize) {
        packed.extend_from_slice(&row[..row_bytes]);
    }

    let sample = pixel_encoding.sample_bytes();
    if sample > 1 && is_bigendian != cfg!(target_endian = "big") {
        for chunk in packed.chunks_exact_mut(sample) {
            chunk.reverse();
        }
    }

    Ok(PixelBuffer {
        width,
        height,
        encoding: pixel_encoding,
        data: packed,
    })
}

fn decode_compressed(data: &[u8], modality: Modality) -> Result<PixelBuffer, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let img = image::load_from_memory(data)?;
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSize { width, height });
    }

    let (encoding, bytes) = match (modality, img) {
        (Modality::Color, DynamicImage::ImageLuma8(buf)) => (PixelEncoding::Mono8, buf.into_raw()),
        (Modality::Color, DynamicImage::ImageRgba8(buf)) => (PixelEncoding::Rgba8, buf.into_raw()),
        (Modality::Color, other) => (PixelEncoding::Rgb8, other.into_rgb8().into_raw()),
        (Modality::Depth, DynamicImage::ImageLuma16(buf)) => {
            let raw = buf.into_raw();
            (PixelEncoding::Depth16, raw.iter().flat_map(|v| v.to_ne_bytes()).collect())
        }
        (Modality::Depth, other) => {
            return Err(DecodeError::ModalityMismatch {
                encoding: format!("{:?}", other.color()),
                modality,
            });
        }
    };

    Ok(PixelBuffer {
        width,
        height,
        encoding,
        data: bytes,
    })
}
