//! Rerun sink for the published chain and odometry.
//!
//! Entity hierarchy:
//!     body/                          - chain root
//!         camera_pose/               - constant body link
//!             pose/                  - tracked camera link
//!                 world              - constant world link
//!     odometry/
//!         pose                       - latest odometry pose
//!         trajectory                 - odometry positions so far (gray line)

use std::collections::HashMap;

use anyhow::{Context, Result};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use rerun::{RecordingStream, external::glam};

use crate::publish::{ChainLink, OdometryRecord, OdometrySink, TransformSink};

#[derive(Clone)]
pub struct RerunSink {
    rec: RecordingStream,
    /// Entity path of every frame seen so far, keyed by frame name.
    paths: HashMap<&'static str, String>,
    trajectory: Vec<[f32; 3]>,
    start_stamp_ns: Option<u64>,
}

impl RerunSink {
    /// Spawn a viewer process and log into it.
    pub fn spawn(app_name: &str) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .spawn()
            .context("Failed to spawn rerun viewer")?;
        Ok(Self::new(rec))
    }

    pub fn new(rec: RecordingStream) -> Self {
        Self {
            rec,
            paths: HashMap::new(),
            trajectory: Vec::new(),
            start_stamp_ns: None,
        }
    }

    /// Relative time from the first record.
    fn set_time(&mut self, stamp_ns: u64) {
        let start_ns = *self.start_stamp_ns.get_or_insert(stamp_ns);
        let relative_sec = stamp_ns.saturating_sub(start_ns) as f64 / 1e9;
        self.rec.set_duration_secs("time", relative_sec);
    }

    fn entity_path(&mut self, parent: &'static str, child: &'static str) -> String {
        let parent_path = self
            .paths
            .entry(parent)
            .or_insert_with(|| parent.to_string())
            .clone();
        let child_path = format!("{}/{}", parent_path, child);
        self.paths.insert(child, child_path.clone());
        child_path
    }
}

fn to_glam(rotation: &UnitQuaternion<f64>, translation: &Vector3<f64>) -> (glam::Vec3, glam::Quat) {
    let t = glam::Vec3::new(
        translation.x as f32,
        translation.y as f32,
        translation.z as f32,
    );
    let q = glam::Quat::from_xyzw(
        rotation.coords.x as f32,
        rotation.coords.y as f32,
        rotation.coords.z as f32,
        rotation.w as f32,
    );
    (t, q)
}

fn quaternion_of(rotation: &Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation))
}

impl TransformSink for RerunSink {
    fn send_transform(&mut self, link: &ChainLink) {
        self.set_time(link.stamp_ns);
        let path = self.entity_path(link.parent_frame, link.child_frame);
        let (translation, rotation) = to_glam(&quaternion_of(&link.rotation), &link.translation);
        self.rec
            .log(
                path,
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();
    }
}

impl OdometrySink for RerunSink {
    fn send_odometry(&mut self, odometry: &OdometryRecord) {
        self.set_time(odometry.stamp_ns);
        let (translation, rotation) = to_glam(&odometry.orientation, &odometry.position);
        self.rec
            .log(
                "odometry/pose",
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();

        let p = &odometry.position;
        self.trajectory.push([p.x as f32, p.y as f32, p.z as f32]);
        if self.trajectory.len() >= 2 {
            self.rec
                .log(
                    "odometry/trajectory",
                    &rerun::LineStrips3D::new([self.trajectory.clone()])
                        .with_colors([[128u8, 128, 128]])
                        .with_radii([0.005f32]),
                )
                .ok();
        }
    }
}
