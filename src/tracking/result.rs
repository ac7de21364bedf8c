//! Engine output as seen by the bridge.

use nalgebra::{Matrix3, Matrix4, RowVector4, Vector3};

/// Pose reported by the tracking engine, in the engine's own convention.
///
/// Absence of a pose ("not localized", "lost") is `Option::None` at every call
/// site, never a sentinel value of this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl RawPose {
    /// Split a homogeneous 4x4 matrix.
    ///
    /// Returns `None` for matrices the engine uses to signal failure: any
    /// non-finite entry, or a bottom row other than `[0 0 0 1]`.
    pub fn from_homogeneous(mat: &Matrix4<f64>) -> Option<Self> {
        if mat.iter().any(|v| !v.is_finite()) {
            return None;
        }
        if mat.row(3) != RowVector4::new(0.0, 0.0, 0.0, 1.0) {
            return None;
        }

        Some(Self {
            rotation: mat.fixed_view::<3, 3>(0, 0).into_owned(),
            translation: Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]),
        })
    }

    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }
}
