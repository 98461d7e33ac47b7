//! Unchecked pool maintenance over the persistent `unchecked` table.
//!
//! Insertion happens in the block processor when a gap is detected; this
//! module provides the capacity guard and the periodic garbage collection
//! for entries whose dependency never arrived.

use weave_blocks::Block;
use weave_store::{
    SignatureVerification, Store, StoreError, UncheckedInfo, UncheckedKey, WriteTransaction,
};
use weave_types::{BlockHash, Timestamp};

/// Upper bound on stored unchecked entries; inserts beyond it are dropped.
pub const MAX_UNCHECKED: u64 = 256 * 1024;

/// Store a block waiting on `dependency`, unless the table is full.
/// Returns `true` when the entry was stored.
pub fn put(
    store: &Store,
    txn: &mut WriteTransaction,
    dependency: BlockHash,
    block: &Block,
    verified: SignatureVerification,
) -> Result<bool, StoreError> {
    if store.unchecked.count(txn.raw())? >= MAX_UNCHECKED {
        return Ok(false);
    }
    let key = UncheckedKey::new(dependency, block.hash());
    let info = UncheckedInfo {
        block: block.clone(),
        modified: Timestamp::now(),
        verified,
    };
    store.unchecked.put(txn.raw_mut(), &key, &info)?;
    Ok(true)
}

/// Drain every entry waiting on `dependency`, removing the rows and
/// returning the blocks for reprocessing.
pub fn drain_dependents(
    store: &Store,
    txn: &mut WriteTransaction,
    dependency: &BlockHash,
) -> Result<Vec<UncheckedInfo>, StoreError> {
    let dependents = store.unchecked.get_dependents(txn.raw(), dependency)?;
    let mut infos = Vec::with_capacity(dependents.len());
    for (key, info) in dependents {
        store.unchecked.del(txn.raw_mut(), &key)?;
        infos.push(info);
    }
    Ok(infos)
}

/// Delete entries older than `cutoff_secs`. Runs while the node is not
/// bootstrapping. Returns how many were removed.
pub fn cleanup(store: &Store, cutoff_secs: u64) -> Result<usize, StoreError> {
    let now = Timestamp::now();
    let expired: Vec<UncheckedKey> = {
        let txn = store.tx_begin_read()?;
        let mut expired = Vec::new();
        for entry in store.unchecked.iter(txn.raw())? {
            let (key, info) = entry?;
            if info.modified.has_expired(cutoff_secs, now) {
                expired.push(key);
            }
        }
        expired
    };
    if expired.is_empty() {
        return Ok(0);
    }
    let mut txn = store.tx_begin_write(weave_store::Writer::BlockProcessor)?;
    for key in &expired {
        store.unchecked.del(txn.raw_mut(), key)?;
    }
    txn.commit()?;
    tracing::debug!(count = expired.len(), "garbage-collected unchecked entries");
    Ok(expired.len())
}
