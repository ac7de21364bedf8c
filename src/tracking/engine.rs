//! Boundary to the external visual tracking engine.

use std::path::Path;

use anyhow::Result;
use nalgebra::Matrix4;

use crate::io::frame::PixelBuffer;

/// An RGB-D tracking engine (e.g. an ORB-SLAM style system).
///
/// The engine keeps its own map and trajectory across calls; callers only
/// forward inputs and relay outputs. It is not assumed to be reentrant, so a
/// single owner drives it from one thread.
pub trait TrackingEngine: Send {
    /// Track one RGB-D pair. Returns the 4x4 camera pose in the engine's
    /// convention, or `None` while not localized.
    fn track_rgbd(
        &mut self,
        color: &PixelBuffer,
        depth: &PixelBuffer,
        timestamp_s: f64,
    ) -> Option<Matrix4<f64>>;

    /// Stop internal worker threads. Called once at teardown.
    fn shutdown(&mut self) {}

    /// Write the keyframe trajectory in TUM format.
    fn save_keyframe_trajectory_tum(&self, path: &Path) -> Result<()>;
}

impl<E: TrackingEngine + ?Sized> TrackingEngine for Box<E> {
    fn track_rgbd(
        &mut self,
        color: &PixelBuffer,
        depth: &PixelBuffer,
        timestamp_s: f64,
    ) -> Option<Matrix4<f64>> {
        (**self).track_rgbd(color, depth, timestamp_s)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn save_keyframe_trajectory_tum(&self, path: &Path) -> Result<()> {
        (**self).save_keyframe_trajectory_tum(path)
    }
}
