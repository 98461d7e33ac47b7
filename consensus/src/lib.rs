//! Active transactions (election index) for the weave node.
//!
//! Tracks which chain positions are contested, which blocks compete for
//! them, and hands confirmed winners to the confirmation-height processor.
//! Vote aggregation, quorum math and difficulty adjustment belong to the
//! outer consensus layer, not this crate.

pub mod active_elections;
pub mod election;
pub mod error;

pub use active_elections::{ActiveElections, QualifiedRoot};
pub use election::{Election, ElectionState};
pub use error::ConsensusError;
