//! Stream synchronization: pairs color and depth frames by capture time.

pub mod synchronizer;

pub use synchronizer::{ApproximateTimeSync, MatchedPair, SyncStats};
