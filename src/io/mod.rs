//! Input side: image messages, decoding, and dataset replay.

pub mod decode;
pub mod frame;
pub mod messages;
pub mod tum;

pub use decode::decode;
pub use frame::{Modality, PixelBuffer, PixelEncoding, TimestampedFrame};
pub use messages::ImageMsg;
