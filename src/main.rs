use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::Sender;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rgbd_bridge::config::BridgeConfig;
use rgbd_bridge::io::tum::{TumDataset, format_stamp};
use rgbd_bridge::io::{ImageMsg, Modality};
use rgbd_bridge::publish::{LogSink, Publisher};
use rgbd_bridge::system::Bridge;
use rgbd_bridge::tracking::{GroundTruthEngine, TrackingEngine};

/// Pair RGB-D streams, track them, and publish the camera pose.
#[derive(Debug, Parser)]
#[command(name = "rgbd_bridge", version)]
struct Args {
    /// Vocabulary file handed to the tracking engine.
    vocabulary: PathBuf,

    /// Engine settings file.
    settings: PathBuf,

    /// TUM RGB-D sequence directory to replay.
    #[arg(long)]
    dataset: PathBuf,

    /// Bridge configuration (YAML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to save the keyframe trajectory at shutdown.
    #[arg(long, default_value = "KeyFrameTrajectory.txt")]
    trajectory: PathBuf,

    /// Stream the published chain to a Rerun viewer.
    #[cfg(feature = "viz")]
    #[arg(long)]
    viz: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = GroundTruthEngine::new(&args.vocabulary, &args.settings)?;

    let dataset = TumDataset::new(&args.dataset)?;
    info!(
        "Loaded {} color and {} depth images from {}",
        dataset.color_entries.len(),
        dataset.depth_entries.len(),
        dataset.root().display()
    );
    log_groundtruth_coverage(&dataset);

    let mut publisher = Publisher::new(config.publish.stamp_source);
    if config.publish.log_odometry {
        publisher.add_odometry_sink(LogSink);
    }
    #[cfg(feature = "viz")]
    if args.viz {
        let sink = rgbd_bridge::viz::RerunSink::spawn("rgbd_bridge")?;
        publisher.add_transform_sink(sink.clone());
        publisher.add_odometry_sink(sink);
    }

    let bridge = Bridge::spawn(engine, publisher, &config)?;

    let color_tx = bridge.color_sender().context("color input closed")?;
    let depth_tx = bridge.depth_sender().context("depth input closed")?;
    let producers = [
        spawn_producer(&dataset, Modality::Color, color_tx)?,
        spawn_producer(&dataset, Modality::Depth, depth_tx)?,
    ];
    for producer in producers {
        producer
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))?;
    }

    let (mut engine, stats) = bridge.join()?;
    info!(
        "Done: {} pose updates published from {} pairs",
        stats.updates_published, stats.pairs_matched
    );

    engine.shutdown();
    engine.save_keyframe_trajectory_tum(&args.trajectory)?;

    Ok(())
}

/// Stream one modality of the dataset into the bridge, in file order.
fn spawn_producer(
    dataset: &TumDataset,
    modality: Modality,
    tx: Sender<ImageMsg>,
) -> Result<thread::JoinHandle<()>> {
    let messages = dataset.messages(modality);
    thread::Builder::new()
        .name(format!("{}-producer", modality))
        .spawn(move || {
            for msg in messages {
                match msg {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("Skipping {} image: {:#}", modality, e),
                }
            }
        })
        .with_context(|| format!("Failed to spawn {} producer", modality))
}

/// Report the ground-truth span against the image span, as a sanity check on
/// the replay engine's settings.
fn log_groundtruth_coverage(dataset: &TumDataset) {
    let (Some(first_gt), Some(last_gt)) = (dataset.groundtruth.first(), dataset.groundtruth.last())
    else {
        info!("Dataset has no ground truth");
        return;
    };
    info!(
        "Ground truth: {} poses from {} to {} (first pos: [{:.2}, {:.2}, {:.2}])",
        dataset.groundtruth.len(),
        format_stamp(first_gt.timestamp_ns),
        format_stamp(last_gt.timestamp_ns),
        first_gt.pose.translation.x,
        first_gt.pose.translation.y,
        first_gt.pose.translation.z,
    );

    let first_image = dataset.color_entries.first().map(|e| e.timestamp_ns);
    let last_image = dataset.color_entries.last().map(|e| e.timestamp_ns);
    if first_image.is_some_and(|t| t < first_gt.timestamp_ns) {
        warn!("First color image is before the first ground-truth pose");
    }
    if last_image.is_some_and(|t| t > last_gt.timestamp_ns) {
        warn!("Last color image is after the last ground-truth pose");
    }
}
