//! Output side: stamped transform chains and odometry records.

pub mod messages;
pub mod publisher;
pub mod sinks;

pub use messages::{ChainLink, OdometryRecord, Published, TransformChain};
pub use publisher::{Clock, OdometrySink, Publisher, StampSource, SystemClock, TransformSink};
pub use sinks::{ChannelSink, LogSink};
