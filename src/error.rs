//! Typed errors for the bridge core.
//!
//! Setup and I/O paths use `anyhow`; only per-frame decoding has an error type
//! callers match on.

use thiserror::Error;

use crate::io::frame::Modality;

/// Why an image message could not be turned into a pixel buffer.
///
/// Always local to one frame: the frame is dropped and the stream continues.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    EmptyPayload,

    #[error("image has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("encoding '{encoding}' is not valid on the {modality} stream")]
    ModalityMismatch { encoding: String, modality: Modality },

    #[error("row step {step} is smaller than {min} bytes")]
    BadStep { step: u32, min: usize },

    #[error("payload has {actual} bytes, expected at least {expected}")]
    ShortBuffer { expected: usize, actual: usize },

    #[error("codec error: {0}")]
    Codec(#[from] image::ImageError),
}
