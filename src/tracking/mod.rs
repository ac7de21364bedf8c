//! Tracking boundary: the engine trait, the adapter that drives it, and a
//! ground-truth replay engine.
//!
//! The visual tracking itself lives behind `TrackingEngine`; this module only
//! forwards matched RGB-D pairs and relays the returned pose.

pub mod adapter;
pub mod engine;
pub mod replay;
pub mod result;

pub use adapter::{AdapterStats, TrackingAdapter};
pub use engine::TrackingEngine;
pub use replay::GroundTruthEngine;
pub use result::RawPose;
