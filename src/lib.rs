pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod publish;
pub mod sync;
pub mod system;
pub mod tracking;
#[cfg(feature = "viz")]
pub mod viz;
