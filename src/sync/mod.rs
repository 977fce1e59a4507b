//! Weather-push sync layer
//!
//! Implements:
//! - Differential strategy selection for live and sample records
//! - Record patching on the receiving side
//! - Wrapping live sequence ids
//! - The send-ordering queue for packets assembled out of order
//! - Per-station diff reference tracking

mod outgoing;
mod patch;
mod sequencer;
mod strategy;
mod tracker;

pub use outgoing::*;
pub use patch::*;
pub use sequencer::*;
pub use strategy::*;
pub use tracker::*;
