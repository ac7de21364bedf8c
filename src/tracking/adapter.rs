//! Tracking adapter: forwards matched pairs to the engine.

use tracing::trace;

use crate::sync::MatchedPair;
use crate::tracking::engine::TrackingEngine;
use crate::tracking::result::RawPose;

/// Call counters. The engine's map state is not mirrored here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub calls: u64,
    pub no_pose: u64,
}

pub struct TrackingAdapter<E: TrackingEngine> {
    engine: E,
    stats: AdapterStats,
}

impl<E: TrackingEngine> TrackingAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            stats: AdapterStats::default(),
        }
    }

    /// Run the engine once on a pair, consuming it.
    ///
    /// `None` means "no update this cycle"; it is not an error.
    pub fn track(&mut self, pair: MatchedPair) -> Option<RawPose> {
        self.stats.calls += 1;
        let timestamp_s = pair.pair_time_ns as f64 / 1e9;

        let pose = self
            .engine
            .track_rgbd(&pair.color.pixels, &pair.depth.pixels, timestamp_s)
            .and_then(|mat| RawPose::from_homogeneous(&mat));

        if pose.is_none() {
            self.stats.no_pose += 1;
            trace!(timestamp_s, "engine returned no pose");
        }
        pose
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Hand the engine back for teardown (shutdown, trajectory save).
    pub fn into_engine(self) -> E {
        self.engine
    }
}
