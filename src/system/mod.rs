//! Bridge runtimes and the state they share.
//!
//! `BridgeCore` runs everything on the caller's thread; `Bridge` splits
//! synchronization and tracking onto two threads joined by bounded channels.

mod bridge;
mod bridge_core;
pub mod shared_state;

pub use bridge::Bridge;
pub use bridge_core::BridgeCore;
pub use shared_state::{BridgeStats, SharedState};
