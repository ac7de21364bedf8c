//! Output records handed to the sinks.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::geometry::RigidTransform;

/// One stamped `parent -> child` transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainLink {
    pub parent_frame: &'static str,
    pub child_frame: &'static str,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub stamp_ns: u64,
}

impl ChainLink {
    pub fn new(
        parent_frame: &'static str,
        child_frame: &'static str,
        transform: RigidTransform,
        stamp_ns: u64,
    ) -> Self {
        Self {
            parent_frame,
            child_frame,
            rotation: transform.rotation,
            translation: transform.translation,
            stamp_ns,
        }
    }
}

/// The three links of one pose update, in publish order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformChain {
    pub links: [ChainLink; 3],
}

/// Pose-only odometry (no velocity, no covariance).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryRecord {
    pub stamp_ns: u64,
    pub frame_id: &'static str,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

/// Anything a publisher emits, for sinks that funnel both kinds into one
/// stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    Transform(ChainLink),
    Odometry(OdometryRecord),
}

impl Published {
    pub fn stamp_ns(&self) -> u64 {
        match self {
            Published::Transform(link) => link.stamp_ns,
            Published::Odometry(odom) => odom.stamp_ns,
        }
    }
}
