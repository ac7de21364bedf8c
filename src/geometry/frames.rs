//! Coordinate frame conventions and the pose re-expression pipeline.
//!
//! The tracking engine reports the camera pose in its own internal
//! convention. Downstream consumers (navigation, visualization, logging) expect
//! a right-handed, x-forward, y-right, z-down frame. A single sign or axis-order
//! slip here corrupts every consumer silently, so every matrix below is spelled
//! out entry by entry.
//!
//! # Published transform chain
//!
//! ```text
//! body ──(R_BODY_CAMERA_POSE, 0)──▶ camera_pose ──(RH, RHt)──▶ pose ──(R_POSE_WORLD, 0)──▶ world
//!        constant                         per frame                   constant
//! ```
//!
//! Consumers compose the links themselves; the constant links are never folded
//! into the per-frame link.
//!
//! # Right-handed camera pose (per frame)
//!
//! Given the engine rotation `R` and translation `t`:
//!
//! ```text
//!      | -R00   R01   R02 |          | t0 |
//! RH = | -R10   R11   R12 |    RHt = | t1 |
//!      |  R20  -R21  -R22 |          | t2 |
//! ```
//!
//! Equivalently `RH = diag(1, 1, -1) * R * diag(-1, 1, 1)`, so `det(RH) = det(R)`
//! and a proper rotation stays a proper rotation.
//!
//! # Odometry record
//!
//! Orientation is the quaternion of `RH`; position is `RHt`. Neither receives
//! the world relabel, which only exists as the `pose -> world` link. The
//! mismatch is kept for compatibility with existing consumers.

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};

use crate::publish::messages::{ChainLink, OdometryRecord, TransformChain};
use crate::tracking::RawPose;

/// Frame names. Part of the external contract, in chain order.
pub const FRAME_BODY: &str = "body";
pub const FRAME_CAMERA_POSE: &str = "camera_pose";
pub const FRAME_POSE: &str = "pose";
pub const FRAME_WORLD: &str = "world";

/// Frame id carried by every odometry record.
pub const ODOMETRY_FRAME_ID: &str = FRAME_WORLD;

/// A rotation matrix plus translation, kept as raw matrix entries so the
/// published values are exactly the ones computed (no quaternion round trip).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

// ============================================================================
// Constant links
// ============================================================================

/// Mounting offset between the engine's camera axes and the body frame:
/// 270 deg about z composed with 270 deg about x.
///
/// Maps:
/// - body +x ← camera +z
/// - body +y ← camera -x
/// - body +z ← camera -y
#[rustfmt::skip]
pub const R_BODY_CAMERA_POSE: Matrix3<f64> = Matrix3::new(
     0.0,  0.0, 1.0,
    -1.0,  0.0, 0.0,
     0.0, -1.0, 0.0,
);

/// World/global axis relabel (tracking "up" becomes navigation "down").
#[rustfmt::skip]
pub const R_POSE_WORLD: Matrix3<f64> = Matrix3::new(
     0.0, 1.0,  0.0,
     0.0, 0.0, -1.0,
    -1.0, 0.0,  0.0,
);

/// `body -> camera_pose`, time invariant.
pub const BODY_LINK: RigidTransform = RigidTransform {
    rotation: R_BODY_CAMERA_POSE,
    translation: Vector3::new(0.0, 0.0, 0.0),
};

/// `pose -> world`, time invariant.
pub const WORLD_LINK: RigidTransform = RigidTransform {
    rotation: R_POSE_WORLD,
    translation: Vector3::new(0.0, 0.0, 0.0),
};

// ============================================================================
// Per-frame conversion
// ============================================================================

/// Apply the engine -> right-handed sign pattern to a rotation.
///
/// The pattern is its own inverse: applying it twice returns the input.
#[rustfmt::skip]
pub fn right_handed_rotation(r: &Matrix3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        -r[(0, 0)],  r[(0, 1)],  r[(0, 2)],
        -r[(1, 0)],  r[(1, 1)],  r[(1, 2)],
         r[(2, 0)], -r[(2, 1)], -r[(2, 2)],
    )
}

/// Rotation matrix to unit quaternion.
///
/// Trace branch when the trace is positive. Otherwise the pivot is the
/// largest diagonal entry, scanning x, y, z and switching only on a strictly
/// larger entry, and the pivot component is made positive. The pivot choice
/// decides the published sign, so ties must stay with the lower axis.
/// The result is normalized.
pub fn quaternion_from_rotation(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let trace = m[(0, 0)] + m[(1, 1)] + m[(2, 2)];

    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        Quaternion::new(
            0.25 * s,
            (m[(2, 1)] - m[(1, 2)]) / s,
            (m[(0, 2)] - m[(2, 0)]) / s,
            (m[(1, 0)] - m[(0, 1)]) / s,
        )
    } else {
        let mut i = 0;
        if m[(1, 1)] > m[(0, 0)] {
            i = 1;
        }
        if m[(2, 2)] > m[(i, i)] {
            i = 2;
        }
        let j = (i + 1) % 3;
        let k = (j + 1) % 3;

        let t = (m[(i, i)] - m[(j, j)] - m[(k, k)] + 1.0).sqrt();
        let half_inv = 0.5 / t;

        let mut v = [0.0; 3];
        v[i] = 0.5 * t;
        v[j] = (m[(j, i)] + m[(i, j)]) * half_inv;
        v[k] = (m[(k, i)] + m[(i, k)]) * half_inv;
        let w = (m[(k, j)] - m[(j, k)]) * half_inv;

        Quaternion::new(w, v[0], v[1], v[2])
    };

    UnitQuaternion::from_quaternion(q)
}

/// Everything derived from one `RawPose`, before stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseUpdate {
    /// Capture time of the matched pair the pose came from.
    pub pair_time_ns: u64,
    /// `camera_pose -> pose` link (RH, RHt).
    pub camera_link: RigidTransform,
    /// Odometry orientation, quaternion of RH.
    pub orientation: UnitQuaternion<f64>,
    /// Odometry position, RHt.
    pub position: Vector3<f64>,
}

impl PoseUpdate {
    /// Run the conversion for one engine pose.
    pub fn from_raw(raw: &RawPose, pair_time_ns: u64) -> Self {
        let rh = right_handed_rotation(&raw.rotation);
        let rh_t = raw.translation;

        Self {
            pair_time_ns,
            camera_link: RigidTransform {
                rotation: rh,
                translation: rh_t,
            },
            orientation: quaternion_from_rotation(&rh),
            position: rh_t,
        }
    }

    /// The three links, in publish order, all carrying `stamp_ns`.
    pub fn chain(&self, stamp_ns: u64) -> TransformChain {
        TransformChain {
            links: [
                ChainLink::new(FRAME_BODY, FRAME_CAMERA_POSE, BODY_LINK, stamp_ns),
                ChainLink::new(FRAME_CAMERA_POSE, FRAME_POSE, self.camera_link, stamp_ns),
                ChainLink::new(FRAME_POSE, FRAME_WORLD, WORLD_LINK, stamp_ns),
            ],
        }
    }

    pub fn odometry(&self, stamp_ns: u64) -> OdometryRecord {
        OdometryRecord {
            stamp_ns,
            frame_id: ODOMETRY_FRAME_ID,
            position: self.position,
            orientation: self.orientation,
        }
    }
}
