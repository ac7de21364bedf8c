//! Geometry: rigid transforms and the published frame conventions.

pub mod frames;
pub mod se3;

pub use frames::{PoseUpdate, RigidTransform};
pub use se3::SE3;
