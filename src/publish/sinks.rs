//! Built-in sinks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{info, trace};

use crate::geometry::frames::FRAME_BODY;
use crate::publish::messages::{ChainLink, OdometryRecord, Published};
use crate::publish::publisher::{OdometrySink, TransformSink};

/// Records per pose update: three chain links and one odometry record.
const RECORDS_PER_UPDATE: usize = 4;

/// Forwards everything into a bounded crossbeam channel.
///
/// The publisher is never blocked. When the first link of a chain arrives
/// and the channel cannot take a whole update, that update is dropped as a
/// unit: its links and the odometry record that follows it. Clones share
/// this decision, so one clone can be registered for transforms and another
/// for odometry. The room check assumes the publisher is the only producer
/// on the channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Published>,
    skipping_update: Arc<AtomicBool>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Published>) -> Self {
        Self {
            tx,
            skipping_update: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<Published>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }

    fn has_room_for_update(&self) -> bool {
        self.tx
            .capacity()
            .is_none_or(|cap| cap.saturating_sub(self.tx.len()) >= RECORDS_PER_UPDATE)
    }

    fn send(&self, item: Published) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("publish channel full, record dropped"),
            Err(TrySendError::Disconnected(_)) => trace!("no subscriber, record dropped"),
        }
    }
}

impl TransformSink for ChannelSink {
    fn send_transform(&mut self, link: &ChainLink) {
        if link.parent_frame == FRAME_BODY {
            let skip = !self.has_room_for_update();
            if skip {
                trace!(stamp_ns = link.stamp_ns, "publish channel full, update dropped");
            }
            self.skipping_update.store(skip, Ordering::Relaxed);
        }
        if !self.skipping_update.load(Ordering::Relaxed) {
            self.send(Published::Transform(*link));
        }
    }
}

impl OdometrySink for ChannelSink {
    fn send_odometry(&mut self, odometry: &OdometryRecord) {
        if self.skipping_update.swap(false, Ordering::Relaxed) {
            return;
        }
        self.send(Published::Odometry(*odometry));
    }
}

/// Writes each odometry record to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl OdometrySink for LogSink {
    fn send_odometry(&mut self, odometry: &OdometryRecord) {
        let p = &odometry.position;
        let q = odometry.orientation.quaternion();
        info!(
            "odom [{}] t={:.6} pos=[{:.3}, {:.3}, {:.3}] q=[{:.4}, {:.4}, {:.4}, {:.4}]",
            odometry.frame_id,
            odometry.stamp_ns as f64 / 1e9,
            p.x,
            p.y,
            p.z,
            q.w,
            q.i,
            q.j,
            q.k
        );
    }
}
