//! Ledger crate — applies and unwinds blocks, computes balances and
//! representative weights, and owns the genesis constants.

pub mod genesis;
pub mod ledger;
pub mod rep_weights;
pub mod result;

pub use genesis::{dev_genesis_keypair, epoch_v1_link, LedgerConstants};
pub use ledger::Ledger;
pub use rep_weights::RepWeights;
pub use result::{ProcessResult, RollbackError};
