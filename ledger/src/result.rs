//! Outcomes of applying a block to the ledger.

use thiserror::Error;

use weave_types::BlockHash;

/// Result of `Ledger::process`. These are values, not errors — the caller
/// decides whether to bootstrap (`Gap*`), drop (`Old`, the invalid kinds),
/// or raise an election (`Fork`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Block was applied.
    Progress,
    /// Block is already in the ledger.
    Old,
    /// The `previous` block is not in the ledger.
    GapPrevious,
    /// The source/link block of a receive is not in the ledger.
    GapSource,
    /// Signature does not verify for the signing account.
    BadSignature,
    /// A send whose balance is not strictly below its predecessor's.
    NegativeSpend,
    /// A receive whose balance delta does not match the pending amount.
    BalanceMismatch,
    /// The pending entry for a receive does not exist (already consumed,
    /// wrong destination, or requires a state block).
    Unreceivable,
    /// Block type is not valid at this position in the chain.
    BlockPosition,
    /// A second block competing for an occupied chain position.
    Fork,
    /// Proof-of-work does not meet the threshold for this block type.
    InsufficientWork,
}

/// Rollback failures. Store I/O errors propagate separately as
/// `StoreError`; these are the ledger-level refusals.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("block {0} is not in the ledger")]
    BlockNotFound(BlockHash),

    #[error("block {hash} at height {height} is cemented (confirmation height {confirmation_height})")]
    Cemented {
        hash: BlockHash,
        height: u64,
        confirmation_height: u64,
    },

    #[error("storage error during rollback: {0}")]
    Store(#[from] weave_store::StoreError),
}
