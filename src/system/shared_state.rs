//! State shared between the bridge threads and whoever observes them.
//!
//! Counters are plain atomics; the latest odometry record sits behind a
//! `parking_lot::RwLock` so observers can read it while the tracking thread
//! keeps publishing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::publish::OdometryRecord;

#[derive(Debug, Default)]
pub struct SharedState {
    decode_failures: AtomicU64,
    /// Total synchronizer drops (aged out, outmatched, evicted, stale).
    frames_dropped: AtomicU64,
    pairs_matched: AtomicU64,
    no_pose: AtomicU64,
    updates_published: AtomicU64,
    latest_odometry: RwLock<Option<OdometryRecord>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub decode_failures: u64,
    pub frames_dropped: u64,
    pub pairs_matched: u64,
    pub no_pose: u64,
    pub updates_published: u64,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The synchronizer owns the running total; mirror it.
    pub fn set_frames_dropped(&self, total: u64) {
        self.frames_dropped.store(total, Ordering::Relaxed);
    }

    pub fn set_pairs_matched(&self, total: u64) {
        self.pairs_matched.store(total, Ordering::Relaxed);
    }

    pub fn record_no_pose(&self) {
        self.no_pose.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self, odometry: OdometryRecord) {
        *self.latest_odometry.write() = Some(odometry);
        self.updates_published.fetch_add(1, Ordering::Release);
    }

    pub fn latest_odometry(&self) -> Option<OdometryRecord> {
        *self.latest_odometry.read()
    }

    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            pairs_matched: self.pairs_matched.load(Ordering::Relaxed),
            no_pose: self.no_pose.load(Ordering::Relaxed),
            updates_published: self.updates_published.load(Ordering::Acquire),
        }
    }
}
