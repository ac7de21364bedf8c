//! TUM RGB-D dataset reader.
//!
//! Layout of a sequence directory:
//!
//! ```text
//! rgb.txt          # timestamp filename
//! depth.txt        # timestamp filename
//! groundtruth.txt  # timestamp tx ty tz qx qy qz qw   (optional)
//! rgb/*.png
//! depth/*.png      # 16-bit, 5000 units per metre
//! ```
//!
//! Color and depth are listed independently and are not synchronized, which is
//! exactly the input the bridge's synchronizer expects.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, StringRecord};
use nalgebra::Vector3;
use tracing::warn;

use crate::geometry::SE3;
use crate::io::frame::Modality;
use crate::io::messages::ImageMsg;

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct GroundTruthEntry {
    pub timestamp_ns: u64,
    /// T_world_camera.
    pub pose: SE3,
}

#[derive(Debug)]
pub struct TumDataset {
    root: PathBuf,
    pub color_entries: Vec<ImageEntry>,
    pub depth_entries: Vec<ImageEntry>,
    pub groundtruth: Vec<GroundTruthEntry>,
}

impl TumDataset {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let color_entries = load_image_list(&root.join("rgb.txt"))?;
        let depth_entries = load_image_list(&root.join("depth.txt"))?;

        if color_entries.is_empty() || depth_entries.is_empty() {
            bail!("dataset {} has no color or no depth images", root.display());
        }

        let groundtruth_path = root.join("groundtruth.txt");
        let groundtruth = if groundtruth_path.exists() {
            load_groundtruth_list(&groundtruth_path).unwrap_or_else(|e| {
                warn!("Could not load ground truth: {}. Continuing without it.", e);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            root,
            color_entries,
            depth_entries,
            groundtruth,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Owned, `Send` iterator over one stream's messages, for producer threads.
    pub fn messages(&self, modality: Modality) -> MessageSource {
        let entries = match modality {
            Modality::Color => self.color_entries.clone(),
            Modality::Depth => self.depth_entries.clone(),
        };
        MessageSource {
            root: self.root.clone(),
            entries: entries.into_iter(),
        }
    }
}

/// Reads image files lazily and wraps them as compressed messages.
pub struct MessageSource {
    root: PathBuf,
    entries: std::vec::IntoIter<ImageEntry>,
}

impl Iterator for MessageSource {
    type Item = Result<ImageMsg>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        let path = self.root.join(&entry.filename);
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_ascii_lowercase();

        Some(
            std::fs::read(&path)
                .with_context(|| format!("Failed to read image {}", path.display()))
                .map(|data| ImageMsg::Compressed {
                    stamp_ns: entry.timestamp_ns,
                    format,
                    data,
                }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

/// Parse a decimal seconds stamp ("1305031102.175304") into nanoseconds
/// without going through a float.
pub fn parse_stamp_ns(text: &str) -> Result<u64> {
    let text = text.trim();
    let (secs, frac) = match text.split_once('.') {
        Some((s, f)) => (s, f),
        None => (text, ""),
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid timestamp '{}'", text);
    }
    if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid timestamp '{}'", text);
    }

    let secs: u64 = secs.parse()?;
    let nanos: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac).parse()?
    };
    secs.checked_mul(1_000_000_000)
        .and_then(|s| s.checked_add(nanos))
        .with_context(|| format!("timestamp '{}' overflows", text))
}

/// Format nanoseconds as TUM decimal seconds (microsecond precision).
pub fn format_stamp(timestamp_ns: u64) -> String {
    format!(
        "{}.{:06}",
        timestamp_ns / 1_000_000_000,
        (timestamp_ns % 1_000_000_000) / 1_000
    )
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Fields of a record with empty entries (repeated spaces) removed.
fn fields(rec: &StringRecord) -> Vec<&str> {
    rec.iter().map(str::trim).filter(|f| !f.is_empty()).collect()
}

pub fn load_image_list(path: &Path) -> Result<Vec<ImageEntry>> {
    let mut rdr = reader(path)?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let f = fields(&rec);
        if f.len() < 2 {
            continue;
        }
        entries.push(ImageEntry {
            timestamp_ns: parse_stamp_ns(f[0])?,
            filename: f[1].to_string(),
        });
    }
    Ok(entries)
}

pub fn load_groundtruth_list(path: &Path) -> Result<Vec<GroundTruthEntry>> {
    let mut rdr = reader(path)?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let f = fields(&rec);
        if f.len() < 8 {
            continue;
        }
        let timestamp_ns = parse_stamp_ns(f[0])?;
        let position = Vector3::new(f[1].parse()?, f[2].parse()?, f[3].parse()?);

        // TUM stores qx qy qz qw (w last)
        let qx: f64 = f[4].parse()?;
        let qy: f64 = f[5].parse()?;
        let qz: f64 = f[6].parse()?;
        let qw: f64 = f[7].parse()?;

        entries.push(GroundTruthEntry {
            timestamp_ns,
            pose: SE3::from_quaternion(qw, qx, qy, qz, position),
        });
    }
    entries.sort_by_key(|e| e.timestamp_ns);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_stamp_ns() {
        assert_eq!(parse_stamp_ns("1305031102.175304").unwrap(), 1_305_031_102_175_304_000);
        assert_eq!(parse_stamp_ns("12").unwrap(), 12_000_000_000);
        assert_eq!(parse_stamp_ns("0.000000001").unwrap(), 1);
        assert!(parse_stamp_ns("1.2.3").is_err());
        assert!(parse_stamp_ns("-4.0").is_err());
        assert!(parse_stamp_ns("1.0000000001").is_err());
    }

    #[test]
    fn test_format_stamp() {
        assert_eq!(format_stamp(1_305_031_102_175_304_000), "1305031102.175304");
        assert_eq!(format_stamp(2_000_050_000), "2.000050");
    }

    #[test]
    fn test_load_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("rgb.txt"),
            "# color images\n# timestamp filename\n1.000000 rgb/1.png\n1.033333 rgb/2.png\n",
        )
        .unwrap();
        fs::write(dir.path().join("depth.txt"), "# depth\n1.010000 depth/1.png\n").unwrap();
        fs::write(
            dir.path().join("groundtruth.txt"),
            "# timestamp tx ty tz qx qy qz qw\n1.0100 0.5 -0.25 1.0 0 0 0 1\n0.9 0 0 0 0 0 0 1\n",
        )
        .unwrap();
        fs::create_dir(dir.path().join("rgb")).unwrap();
        fs::write(dir.path().join("rgb/1.png"), b"not really a png").unwrap();

        let ds = TumDataset::new(dir.path()).unwrap();
        assert_eq!(ds.color_entries.len(), 2);
        assert_eq!(ds.color_entries[1].timestamp_ns, 1_033_333_000);
        assert_eq!(ds.depth_entries[0].filename, "depth/1.png");

        // sorted by time
        assert_eq!(ds.groundtruth[0].timestamp_ns, 900_000_000);
        assert_eq!(ds.groundtruth[1].pose.translation, Vector3::new(0.5, -0.25, 1.0));

        let mut color = ds.messages(Modality::Color);
        let first = color.next().unwrap().unwrap();
        assert_eq!(first.stamp_ns(), 1_000_000_000);
        // second file is missing on disk
        assert!(color.next().unwrap().is_err());
        assert!(color.next().is_none());
    }

    #[test]
    fn test_missing_lists_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TumDataset::new(dir.path()).is_err());
    }
}
