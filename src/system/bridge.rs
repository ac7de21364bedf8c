//! Threaded bridge.
//!
//! ```text
//! color ──bounded──┐
//!                  ├─▶ sync thread ──bounded(1)──▶ tracking thread ──▶ sinks
//! depth ──bounded──┘   (decode, pair)              (engine, transform, publish)
//! ```
//!
//! The engine is only ever called from the tracking thread. A slow engine
//! blocks the capacity-1 hand-off, which stalls the sync thread, which fills
//! the input channels and finally blocks the producers.
//!
//! Shutdown: drop every input sender. The sync thread flushes, closes the pair
//! channel, and the tracking thread drains it and hands the engine back.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded, never, select};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::io::{ImageMsg, Modality};
use crate::publish::Publisher;
use crate::sync::MatchedPair;
use crate::tracking::TrackingEngine;

use super::bridge_core::{SyncStage, TrackingStage};
use super::shared_state::{BridgeStats, SharedState};

/// Pairs waiting for the engine. One slot: at most one pair is queued while
/// the engine works on the previous one.
const PAIR_CHANNEL_CAPACITY: usize = 1;

pub struct Bridge<E: TrackingEngine + 'static> {
    shared: Arc<SharedState>,
    color_tx: Option<Sender<ImageMsg>>,
    depth_tx: Option<Sender<ImageMsg>>,
    sync_handle: Option<JoinHandle<()>>,
    tracking_handle: Option<JoinHandle<E>>,
}

impl<E: TrackingEngine + 'static> Bridge<E> {
    /// Spawn the sync and tracking threads.
    pub fn spawn(engine: E, publisher: Publisher, config: &BridgeConfig) -> Result<Self> {
        let shared = SharedState::new();

        let capacity = config.channels.input_capacity;
        let (color_tx, color_rx) = bounded::<ImageMsg>(capacity);
        let (depth_tx, depth_rx) = bounded::<ImageMsg>(capacity);
        let (pair_tx, pair_rx) = bounded::<MatchedPair>(PAIR_CHANNEL_CAPACITY);

        let sync_stage = SyncStage::new(config, shared.clone());
        let sync_handle = thread::Builder::new()
            .name("rgbd-sync".into())
            .spawn(move || run_sync(sync_stage, color_rx, depth_rx, pair_tx))
            .context("Failed to spawn sync thread")?;

        let tracking_stage = TrackingStage::new(engine, publisher, shared.clone());
        let tracking_handle = thread::Builder::new()
            .name("rgbd-tracking".into())
            .spawn(move || run_tracking(tracking_stage, pair_rx))
            .context("Failed to spawn tracking thread")?;

        info!(
            "Bridge started (tolerance {} ms, queue {}, input capacity {})",
            config.sync.tolerance_ms, config.sync.queue_size, capacity
        );

        Ok(Self {
            shared,
            color_tx: Some(color_tx),
            depth_tx: Some(depth_tx),
            sync_handle: Some(sync_handle),
            tracking_handle: Some(tracking_handle),
        })
    }

    /// Sender for the color stream. Clones must be dropped before `join`
    /// can complete.
    pub fn color_sender(&self) -> Option<Sender<ImageMsg>> {
        self.color_tx.clone()
    }

    pub fn depth_sender(&self) -> Option<Sender<ImageMsg>> {
        self.depth_tx.clone()
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Close the inputs, wait for both threads to drain, and return the
    /// engine for teardown.
    pub fn join(mut self) -> Result<(E, BridgeStats)> {
        self.color_tx = None;
        self.depth_tx = None;

        if let Some(handle) = self.sync_handle.take() {
            handle.join().map_err(|_| anyhow!("sync thread panicked"))?;
        }
        let engine = self
            .tracking_handle
            .take()
            .context("tracking thread already joined")?
            .join()
            .map_err(|_| anyhow!("tracking thread panicked"))?;

        let stats = self.shared.snapshot();
        info!(
            "Bridge stopped: {} pairs, {} published, {} without pose, {} frames dropped, {} decode failures",
            stats.pairs_matched,
            stats.updates_published,
            stats.no_pose,
            stats.frames_dropped,
            stats.decode_failures
        );
        Ok((engine, stats))
    }
}

impl<E: TrackingEngine + 'static> Drop for Bridge<E> {
    fn drop(&mut self) {
        self.color_tx = None;
        self.depth_tx = None;
        if let Some(handle) = self.sync_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.tracking_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_sync(
    mut stage: SyncStage,
    color_rx: Receiver<ImageMsg>,
    depth_rx: Receiver<ImageMsg>,
    pair_tx: Sender<MatchedPair>,
) {
    let closed = never::<ImageMsg>();
    let mut color_open = true;
    let mut depth_open = true;

    while color_open || depth_open {
        let (msg, modality) = select! {
            recv(if color_open { &color_rx } else { &closed }) -> msg => (msg, Modality::Color),
            recv(if depth_open { &depth_rx } else { &closed }) -> msg => (msg, Modality::Depth),
        };

        let Ok(msg) = msg else {
            debug!(%modality, "input stream closed");
            match modality {
                Modality::Color => color_open = false,
                Modality::Depth => depth_open = false,
            }
            continue;
        };

        for pair in stage.ingest(&msg, modality) {
            if pair_tx.send(pair).is_err() {
                return;
            }
        }
    }

    for pair in stage.flush() {
        if pair_tx.send(pair).is_err() {
            return;
        }
    }
}

fn run_tracking<E: TrackingEngine>(
    mut stage: TrackingStage<E>,
    pair_rx: Receiver<MatchedPair>,
) -> E {
    for pair in pair_rx.iter() {
        stage.process(pair);
    }
    stage.into_engine()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{ChannelSink, Published, StampSource};
    use crate::system::bridge_core::tests::{StubEngine, color_msg, depth_msg};

    fn bridge(capacity: usize) -> (Bridge<StubEngine>, Receiver<Published>) {
        let (sink, rx) = ChannelSink::bounded(256);
        let mut publisher = Publisher::new(StampSource::CaptureTime);
        publisher.add_transform_sink(sink.clone());
        publisher.add_odometry_sink(sink);

        let mut config = BridgeConfig::default();
        config.channels.input_capacity = capacity;
        config.sync.queue_size = 32;
        (
            Bridge::spawn(StubEngine::new(false), publisher, &config).unwrap(),
            rx,
        )
    }

    #[test]
    fn test_streams_from_two_threads_pair_up() {
        let (bridge, rx) = bridge(2);
        let color_tx = bridge.color_sender().unwrap();
        let depth_tx = bridge.depth_sender().unwrap();

        let color_producer = thread::spawn(move || {
            for i in 0..20 {
                color_tx.send(color_msg(i * 33)).unwrap();
            }
        });
        let depth_producer = thread::spawn(move || {
            for i in 0..20 {
                depth_tx.send(depth_msg(i * 33 + 4)).unwrap();
            }
        });
        color_producer.join().unwrap();
        depth_producer.join().unwrap();

        let (engine, stats) = bridge.join().unwrap();
        assert_eq!(stats.pairs_matched, 20);
        assert_eq!(stats.updates_published, 20);
        assert_eq!(engine.timestamps.len(), 20);
        assert!(engine.timestamps.windows(2).all(|w| w[0] < w[1]));

        let odometry: Vec<u64> = rx
            .try_iter()
            .filter_map(|p| match p {
                Published::Odometry(o) => Some(o.stamp_ns),
                Published::Transform(_) => None,
            })
            .collect();
        let expected: Vec<u64> = (0..20).map(|i| i * 33 * 1_000_000).collect();
        assert_eq!(odometry, expected);
    }

    #[test]
    fn test_join_without_input() {
        let (bridge, rx) = bridge(4);
        let (engine, stats) = bridge.join().unwrap();
        assert!(engine.timestamps.is_empty());
        assert_eq!(stats, BridgeStats::default());
        assert!(rx.try_recv().is_err());
    }
}
