//! Publisher: stamps a pose update and hands it to every registered sink.
//!
//! Sinks are fire-and-forget. A pose update either produces all three chain
//! links plus one odometry record, or nothing at all.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::debug;

use crate::geometry::PoseUpdate;
use crate::publish::messages::{ChainLink, OdometryRecord};
use crate::tracking::RawPose;

pub trait TransformSink: Send {
    fn send_transform(&mut self, link: &ChainLink);
}

pub trait OdometrySink: Send {
    fn send_odometry(&mut self, odometry: &OdometryRecord);
}

/// Wall clock used for publish-time stamps.
pub trait Clock: Send {
    fn now_ns(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// Which time the published records carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StampSource {
    /// Wall-clock time at publish.
    #[default]
    PublishTime,
    /// Capture time of the matched pair.
    CaptureTime,
}

pub struct Publisher {
    stamp_source: StampSource,
    clock: Box<dyn Clock>,
    transform_sinks: Vec<Box<dyn TransformSink>>,
    odometry_sinks: Vec<Box<dyn OdometrySink>>,
}

impl Publisher {
    pub fn new(stamp_source: StampSource) -> Self {
        Self::with_clock(stamp_source, Box::new(SystemClock))
    }

    pub fn with_clock(stamp_source: StampSource, clock: Box<dyn Clock>) -> Self {
        Self {
            stamp_source,
            clock,
            transform_sinks: Vec::new(),
            odometry_sinks: Vec::new(),
        }
    }

    pub fn add_transform_sink<S: TransformSink + 'static>(&mut self, sink: S) {
        self.transform_sinks.push(Box::new(sink));
    }

    pub fn add_odometry_sink<S: OdometrySink + 'static>(&mut self, sink: S) {
        self.odometry_sinks.push(Box::new(sink));
    }

    pub fn stamp_source(&self) -> StampSource {
        self.stamp_source
    }

    /// Publish the result of one tracking cycle. `None` publishes nothing.
    ///
    /// Returns the odometry record that went out, if any.
    pub fn publish(&mut self, pose: Option<&RawPose>, pair_time_ns: u64) -> Option<OdometryRecord> {
        let update = PoseUpdate::from_raw(pose?, pair_time_ns);
        Some(self.publish_update(&update))
    }

    /// Emit the three links in chain order, then the odometry record.
    pub fn publish_update(&mut self, update: &PoseUpdate) -> OdometryRecord {
        let stamp_ns = match self.stamp_source {
            StampSource::PublishTime => self.clock.now_ns(),
            StampSource::CaptureTime => update.pair_time_ns,
        };

        let chain = update.chain(stamp_ns);
        for link in &chain.links {
            for sink in &mut self.transform_sinks {
                sink.send_transform(link);
            }
        }

        let odometry = update.odometry(stamp_ns);
        for sink in &mut self.odometry_sinks {
            sink.send_odometry(&odometry);
        }

        debug!(
            pair_time_ns = update.pair_time_ns,
            stamp_ns,
            x = odometry.position.x,
            y = odometry.position.y,
            z = odometry.position.z,
            "published pose"
        );
        odometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::frames::{FRAME_BODY, FRAME_CAMERA_POSE, FRAME_POSE, FRAME_WORLD};
    use crate::publish::messages::Published;
    use crate::publish::sinks::ChannelSink;
    use nalgebra::{Matrix3, Vector3};

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ns(&self) -> u64 {
            self.0
        }
    }

    fn identity_pose() -> RawPose {
        RawPose {
            rotation: Matrix3::identity(),
            translation: Vector3::new(1.0, 2.0, 3.0),
        }
    }

    fn publisher_with_channel(source: StampSource) -> (Publisher, crossbeam_channel::Receiver<Published>) {
        let (sink, rx) = ChannelSink::bounded(16);
        let mut publisher = Publisher::with_clock(source, Box::new(FixedClock(7_000)));
        publisher.add_transform_sink(sink.clone());
        publisher.add_odometry_sink(sink);
        (publisher, rx)
    }

    #[test]
    fn test_no_pose_publishes_nothing() {
        let (mut publisher, rx) = publisher_with_channel(StampSource::PublishTime);
        assert!(publisher.publish(None, 100).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_links_then_odometry_with_one_stamp() {
        let (mut publisher, rx) = publisher_with_channel(StampSource::PublishTime);
        let odom = publisher.publish(Some(&identity_pose()), 100).unwrap();
        assert_eq!(odom.stamp_ns, 7_000);

        let out: Vec<Published> = rx.try_iter().collect();
        assert_eq!(out.len(), 4);

        let frames: Vec<(&str, &str)> = out[..3]
            .iter()
            .map(|p| match p {
                Published::Transform(link) => (link.parent_frame, link.child_frame),
                Published::Odometry(_) => panic!("odometry before the chain"),
            })
            .collect();
        assert_eq!(
            frames,
            vec![
                (FRAME_BODY, FRAME_CAMERA_POSE),
                (FRAME_CAMERA_POSE, FRAME_POSE),
                (FRAME_POSE, FRAME_WORLD),
            ]
        );
        assert!(matches!(out[3], Published::Odometry(o) if o == odom));
        assert!(out.iter().all(|p| p.stamp_ns() == 7_000));
    }

    #[test]
    fn test_capture_time_stamping() {
        let (mut publisher, rx) = publisher_with_channel(StampSource::CaptureTime);
        publisher.publish(Some(&identity_pose()), 123_456).unwrap();
        assert!(rx.try_iter().all(|p| p.stamp_ns() == 123_456));
    }

    #[test]
    fn test_publisher_without_sinks_still_reports() {
        let mut publisher = Publisher::new(StampSource::CaptureTime);
        let odom = publisher.publish(Some(&identity_pose()), 5).unwrap();
        assert_eq!(odom.position, Vector3::new(1.0, 2.0, 3.0));
    }
}
