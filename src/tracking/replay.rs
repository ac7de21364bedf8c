//! Ground-truth replay engine.
//!
//! A deterministic `TrackingEngine` that answers each pair with the recorded
//! ground-truth pose closest in time. It stands in for a full visual SLAM
//! system when exercising the bridge end to end on a recorded sequence.
//!
//! Like a SLAM system, it anchors its world frame at the first tracked camera
//! and reports `T_cw` (world -> camera).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use nalgebra::Matrix4;
use serde::Deserialize;
use tracing::{debug, info};

use crate::geometry::SE3;
use crate::io::frame::PixelBuffer;
use crate::io::tum::{GroundTruthEntry, format_stamp, load_groundtruth_list};
use crate::tracking::engine::TrackingEngine;

/// Minimum motion between keyframes.
const KEYFRAME_MIN_TRANSLATION_M: f64 = 0.05;
const KEYFRAME_MIN_ROTATION_RAD: f64 = 0.087; // ~5 deg

/// Engine settings file (YAML).
#[derive(Debug, Deserialize)]
struct ReplaySettings {
    /// TUM ground-truth file, relative paths resolve against the settings file.
    groundtruth: PathBuf,
    /// Largest stamp gap (seconds) accepted when matching a pair to ground truth.
    #[serde(default = "default_max_time_diff")]
    max_time_diff: f64,
}

fn default_max_time_diff() -> f64 {
    0.02
}

pub struct GroundTruthEngine {
    groundtruth: Vec<GroundTruthEntry>,
    max_time_diff_ns: u64,
    /// T_world_cam of the first tracked frame.
    origin: Option<SE3>,
    /// (stamp, T_origin_cam) of selected keyframes.
    keyframes: Vec<(u64, SE3)>,
    shut_down: bool,
}

impl GroundTruthEngine {
    /// Construct from the two startup resources.
    ///
    /// The vocabulary is only checked for presence; replay needs no features.
    pub fn new(vocabulary: &Path, settings: &Path) -> Result<Self> {
        if !vocabulary.exists() {
            bail!("vocabulary file {} not found", vocabulary.display());
        }
        let file = File::open(settings)
            .with_context(|| format!("Failed to open settings {}", settings.display()))?;
        let parsed: ReplaySettings = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse settings {}", settings.display()))?;

        if !parsed.max_time_diff.is_finite() || parsed.max_time_diff < 0.0 {
            bail!("max_time_diff must be a non-negative number of seconds");
        }

        let gt_path = if parsed.groundtruth.is_relative() {
            settings
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&parsed.groundtruth)
        } else {
            parsed.groundtruth.clone()
        };
        let groundtruth = load_groundtruth_list(&gt_path)?;
        if groundtruth.is_empty() {
            bail!("ground truth {} has no poses", gt_path.display());
        }

        info!(
            "Replay engine loaded {} ground-truth poses from {}",
            groundtruth.len(),
            gt_path.display()
        );
        Ok(Self::from_entries(
            groundtruth,
            (parsed.max_time_diff * 1e9).round() as u64,
        ))
    }

    /// Build directly from sorted entries.
    pub fn from_entries(groundtruth: Vec<GroundTruthEntry>, max_time_diff_ns: u64) -> Self {
        Self {
            groundtruth,
            max_time_diff_ns,
            origin: None,
            keyframes: Vec::new(),
            shut_down: false,
        }
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    /// Closest entry within the matching window.
    fn lookup(&self, timestamp_ns: u64) -> Option<&GroundTruthEntry> {
        let idx = self
            .groundtruth
            .partition_point(|gt| gt.timestamp_ns < timestamp_ns);

        let before = idx.checked_sub(1).and_then(|i| self.groundtruth.get(i));
        let after = self.groundtruth.get(idx);
        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp_ns - b.timestamp_ns <= a.timestamp_ns - timestamp_ns {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        (best.timestamp_ns.abs_diff(timestamp_ns) <= self.max_time_diff_ns).then_some(best)
    }

    fn maybe_add_keyframe(&mut self, timestamp_ns: u64, t_origin_cam: &SE3) {
        let is_keyframe = match self.keyframes.last() {
            None => true,
            Some((_, last)) => {
                let delta = last.inverse().compose(t_origin_cam);
                delta.translation.norm() > KEYFRAME_MIN_TRANSLATION_M
                    || delta.rotation.angle() > KEYFRAME_MIN_ROTATION_RAD
            }
        };
        if is_keyframe {
            self.keyframes.push((timestamp_ns, t_origin_cam.clone()));
        }
    }
}

impl TrackingEngine for GroundTruthEngine {
    fn track_rgbd(
        &mut self,
        _color: &PixelBuffer,
        _depth: &PixelBuffer,
        timestamp_s: f64,
    ) -> Option<Matrix4<f64>> {
        if self.shut_down {
            return None;
        }
        let timestamp_ns = (timestamp_s * 1e9).round() as u64;
        let t_world_cam = self.lookup(timestamp_ns)?.pose.clone();

        let origin = self.origin.get_or_insert_with(|| t_world_cam.clone());
        let t_origin_cam = origin.inverse().compose(&t_world_cam);

        self.maybe_add_keyframe(timestamp_ns, &t_origin_cam);
        debug!(timestamp_s, keyframes = self.keyframes.len(), "replayed pose");

        Some(t_origin_cam.inverse().to_matrix())
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
        info!("Replay engine shut down after {} keyframes", self.keyframes.len());
    }

    fn save_keyframe_trajectory_tum(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create trajectory file {}", path.display()))?;
        let mut out = BufWriter::new(file);

        for (timestamp_ns, pose) in &self.keyframes {
            let t = &pose.translation;
            let q = &pose.rotation;
            writeln!(
                out,
                "{} {:.7} {:.7} {:.7} {:.7} {:.7} {:.7} {:.7}",
                format_stamp(*timestamp_ns),
                t.x,
                t.y,
                t.z,
                q.coords.x,
                q.coords.y,
                q.coords.z,
                q.coords.w
            )?;
        }
        out.flush()?;
        info!("Saved {} keyframes to {}", self.keyframes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::frame::PixelEncoding;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::fs;

    fn buffer() -> PixelBuffer {
        PixelBuffer {
            width: 1,
            height: 1,
            encoding: PixelEncoding::Mono8,
            data: vec![0],
        }
    }

    fn entry(t_ns: u64, x: f64) -> GroundTruthEntry {
        GroundTruthEntry {
            timestamp_ns: t_ns,
            pose: SE3::from_quaternion(1.0, 0.0, 0.0, 0.0, Vector3::new(x, 1.0, 2.0)),
        }
    }

    #[test]
    fn test_poses_are_relative_to_first_tracked_frame() {
        let mut engine = GroundTruthEngine::from_entries(
            vec![entry(1_000_000_000, 5.0), entry(2_000_000_000, 6.0)],
            10_000_000,
        );
        let (c, d) = (buffer(), buffer());

        let first = engine.track_rgbd(&c, &d, 1.0).unwrap();
        assert_relative_eq!(first, Matrix4::identity(), epsilon = 1e-12);

        // camera moved +1 along x, so T_cw translates by -1
        let second = engine.track_rgbd(&c, &d, 2.005).unwrap();
        assert_relative_eq!(second[(0, 3)], -1.0, epsilon = 1e-12);
        assert_eq!(engine.num_keyframes(), 2);
    }

    #[test]
    fn test_no_pose_outside_window_or_after_shutdown() {
        let mut engine = GroundTruthEngine::from_entries(vec![entry(1_000_000_000, 0.0)], 10_000_000);
        let (c, d) = (buffer(), buffer());

        assert!(engine.track_rgbd(&c, &d, 1.5).is_none());
        assert!(engine.track_rgbd(&c, &d, 1.009).is_some());
        engine.shutdown();
        assert!(engine.track_rgbd(&c, &d, 1.0).is_none());
    }

    #[test]
    fn test_new_reads_settings_and_saves_trajectory() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = dir.path().join("ORBvoc.txt");
        fs::write(&vocab, "vocab").unwrap();
        fs::write(
            dir.path().join("groundtruth.txt"),
            "1.0 0 0 0 0 0 0 1\n1.5 0.2 0 0 0 0 0 1\n",
        )
        .unwrap();
        let settings = dir.path().join("replay.yaml");
        fs::write(&settings, "groundtruth: groundtruth.txt\nmax_time_diff: 0.01\n").unwrap();

        let mut engine = GroundTruthEngine::new(&vocab, &settings).unwrap();
        let (c, d) = (buffer(), buffer());
        assert!(engine.track_rgbd(&c, &d, 1.0).is_some());
        assert!(engine.track_rgbd(&c, &d, 1.5).is_some());

        let out = dir.path().join("KeyFrameTrajectory.txt");
        engine.save_keyframe_trajectory_tum(&out).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parse = |line: &str| -> Vec<f64> {
            line.split(' ').skip(1).map(|v| v.parse().unwrap()).collect()
        };
        assert!(lines[0].starts_with("1.000000 "));
        assert!(lines[1].starts_with("1.500000 "));
        assert_relative_eq!(parse(lines[0])[6], 1.0, epsilon = 1e-7);
        assert_relative_eq!(parse(lines[1])[0], 0.2, epsilon = 1e-7);
    }

    #[test]
    fn test_new_requires_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("replay.yaml");
        fs::write(&settings, "groundtruth: gt.txt\n").unwrap();
        assert!(GroundTruthEngine::new(&dir.path().join("missing.txt"), &settings).is_err());
    }
}
