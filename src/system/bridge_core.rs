//! Single-threaded bridge core.
//!
//! Each incoming message is decoded, offered to the synchronizer, and every
//! pair that comes out is tracked and published before the call returns.
//! The two stages are also used on their own by the threaded `Bridge`.

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::BridgeConfig;
use crate::io::{ImageMsg, Modality, decode};
use crate::publish::Publisher;
use crate::sync::{ApproximateTimeSync, MatchedPair};
use crate::tracking::{TrackingAdapter, TrackingEngine};

use super::shared_state::{BridgeStats, SharedState};

/// Decoder plus synchronizer.
pub(crate) struct SyncStage {
    sync: ApproximateTimeSync,
    shared: Arc<SharedState>,
}

impl SyncStage {
    pub(crate) fn new(config: &BridgeConfig, shared: Arc<SharedState>) -> Self {
        Self {
            sync: ApproximateTimeSync::new(config.tolerance_ns(), config.sync.queue_size),
            shared,
        }
    }

    /// Decode one message and return the pairs it completes.
    pub(crate) fn ingest(&mut self, msg: &ImageMsg, modality: Modality) -> Vec<MatchedPair> {
        let frame = match decode(msg, modality) {
            Ok(frame) => frame,
            Err(e) => {
                error!(%modality, stamp_ns = msg.stamp_ns(), "Failed to decode image: {}", e);
                self.shared.record_decode_failure();
                return Vec::new();
            }
        };

        let pairs = self.sync.push(frame);
        self.mirror_stats();
        pairs
    }

    pub(crate) fn flush(&mut self) -> Vec<MatchedPair> {
        let pairs = self.sync.flush();
        self.mirror_stats();
        pairs
    }

    fn mirror_stats(&self) {
        let stats = self.sync.stats();
        self.shared.set_frames_dropped(stats.dropped());
        self.shared.set_pairs_matched(stats.pairs);
    }
}

/// Tracking adapter plus publisher.
pub(crate) struct TrackingStage<E: TrackingEngine> {
    adapter: TrackingAdapter<E>,
    publisher: Publisher,
    shared: Arc<SharedState>,
}

impl<E: TrackingEngine> TrackingStage<E> {
    pub(crate) fn new(engine: E, publisher: Publisher, shared: Arc<SharedState>) -> Self {
        Self {
            adapter: TrackingAdapter::new(engine),
            publisher,
            shared,
        }
    }

    /// Track one pair and publish the result. Returns whether anything was
    /// published.
    pub(crate) fn process(&mut self, pair: MatchedPair) -> bool {
        let pair_time_ns = pair.pair_time_ns;
        debug!(pair_time_ns, gap_ns = pair.gap_ns(), "tracking pair");

        let pose = self.adapter.track(pair);
        match self.publisher.publish(pose.as_ref(), pair_time_ns) {
            Some(odometry) => {
                self.shared.record_published(odometry);
                true
            }
            None => {
                self.shared.record_no_pose();
                false
            }
        }
    }

    pub(crate) fn into_engine(self) -> E {
        self.adapter.into_engine()
    }
}

/// Callback-driven bridge: everything runs on the caller's thread.
pub struct BridgeCore<E: TrackingEngine> {
    sync: SyncStage,
    tracking: TrackingStage<E>,
    shared: Arc<SharedState>,
}

impl<E: TrackingEngine> BridgeCore<E> {
    pub fn new(engine: E, publisher: Publisher, config: &BridgeConfig) -> Self {
        let shared = SharedState::new();
        Self {
            sync: SyncStage::new(config, shared.clone()),
            tracking: TrackingStage::new(engine, publisher, shared.clone()),
            shared,
        }
    }

    /// Returns the number of pose updates published as a result.
    pub fn on_color(&mut self, msg: &ImageMsg) -> usize {
        self.on_message(msg, Modality::Color)
    }

    pub fn on_depth(&mut self, msg: &ImageMsg) -> usize {
        self.on_message(msg, Modality::Depth)
    }

    pub fn on_message(&mut self, msg: &ImageMsg, modality: Modality) -> usize {
        let pairs = self.sync.ingest(msg, modality);
        self.process_all(pairs)
    }

    /// End of input: pair what is still buffered and process it.
    pub fn flush(&mut self) -> usize {
        let pairs = self.sync.flush();
        self.process_all(pairs)
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.snapshot()
    }

    pub fn into_engine(self) -> E {
        self.tracking.into_engine()
    }

    fn process_all(&mut self, pairs: Vec<MatchedPair>) -> usize {
        pairs
            .into_iter()
            .map(|pair| self.tracking.process(pair))
            .filter(|&published| published)
            .count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;

    use anyhow::Result;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Vector3};

    use crate::io::PixelBuffer;
    use crate::publish::{ChannelSink, Published, StampSource};

    /// Returns a fixed translation for every call, or nothing on odd calls
    /// when `skip_odd` is set. Records the timestamps it was called with.
    pub(crate) struct StubEngine {
        pub skip_odd: bool,
        pub timestamps: Vec<f64>,
    }

    impl StubEngine {
        pub(crate) fn new(skip_odd: bool) -> Self {
            Self {
                skip_odd,
                timestamps: Vec::new(),
            }
        }
    }

    impl TrackingEngine for StubEngine {
        fn track_rgbd(
            &mut self,
            color: &PixelBuffer,
            depth: &PixelBuffer,
            timestamp_s: f64,
        ) -> Option<Matrix4<f64>> {
            assert_eq!(color.encoding, crate::io::PixelEncoding::Mono8);
            assert_eq!(depth.encoding, crate::io::PixelEncoding::Depth16);
            self.timestamps.push(timestamp_s);
            if self.skip_odd && self.timestamps.len() % 2 == 0 {
                return None;
            }
            let mut pose = Matrix4::identity();
            pose[(0, 3)] = 1.0;
            pose[(1, 3)] = 2.0;
            pose[(2, 3)] = 3.0;
            Some(pose)
        }

        fn save_keyframe_trajectory_tum(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    pub(crate) fn color_msg(stamp_ms: u64) -> ImageMsg {
        ImageMsg::raw(stamp_ms * 1_000_000, 2, 2, "mono8", vec![10; 4])
    }

    pub(crate) fn depth_msg(stamp_ms: u64) -> ImageMsg {
        ImageMsg::raw(stamp_ms * 1_000_000, 2, 2, "16UC1", vec![1; 8])
    }

    fn core(skip_odd: bool) -> (BridgeCore<StubEngine>, crossbeam_channel::Receiver<Published>) {
        let (sink, rx) = ChannelSink::bounded(64);
        let mut publisher = Publisher::new(StampSource::CaptureTime);
        publisher.add_transform_sink(sink.clone());
        publisher.add_odometry_sink(sink);
        (
            BridgeCore::new(StubEngine::new(skip_odd), publisher, &BridgeConfig::default()),
            rx,
        )
    }

    #[test]
    fn test_pair_flows_to_publish() {
        let (mut core, rx) = core(false);
        assert_eq!(core.on_color(&color_msg(100)), 0);
        assert_eq!(core.on_depth(&depth_msg(105)), 0);
        assert_eq!(core.flush(), 1);

        let out: Vec<Published> = rx.try_iter().collect();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|p| p.stamp_ns() == 100_000_000));
        match &out[3] {
            Published::Odometry(odom) => {
                assert_eq!(odom.position, Vector3::new(1.0, 2.0, 3.0));
            }
            other => panic!("expected odometry last, got {:?}", other),
        }

        let stats = core.stats();
        assert_eq!(stats.pairs_matched, 1);
        assert_eq!(stats.updates_published, 1);
        assert!(core.shared_state().latest_odometry().is_some());

        let engine = core.into_engine();
        assert_relative_eq!(engine.timestamps[0], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_no_pose_publishes_nothing_for_that_cycle() {
        let (mut core, rx) = core(true);
        for (c, d) in [(0, 3), (40, 43), (80, 83)] {
            core.on_color(&color_msg(c));
            core.on_depth(&depth_msg(d));
        }
        core.flush();

        let stats = core.stats();
        assert_eq!(stats.pairs_matched, 3);
        assert_eq!(stats.no_pose, 1);
        assert_eq!(stats.updates_published, 2);
        assert_eq!(rx.try_iter().count(), 8);
    }

    #[test]
    fn test_decode_failure_is_counted_and_skipped() {
        let (mut core, rx) = core(false);
        let broken = ImageMsg::raw(0, 2, 2, "mono8", Vec::new());
        assert_eq!(core.on_color(&broken), 0);
        assert_eq!(core.on_color(&color_msg(0)), 0);
        core.on_depth(&depth_msg(1));
        core.flush();

        let stats = core.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.pairs_matched, 1);
        assert_eq!(rx.try_iter().count(), 4);
    }
}
