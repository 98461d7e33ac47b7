//! Read and write transactions plus the process-wide write queue.
//!
//! LMDB already serializes writers internally, but the queue in front of it
//! records *who* is writing so a stuck confirmation advance or bootstrap
//! batch can be identified from logs, and so waiters are woken in a
//! well-defined order.

use heed::{RoTxn, RwTxn};
use std::sync::{Arc, Condvar, Mutex};

use crate::StoreError;

/// Identifies the subsystem holding (or waiting for) the write lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Writer {
    BlockProcessor,
    ConfirmationHeight,
    Bootstrap,
    OnlineWeight,
    /// Miscellaneous node maintenance (peer table, vote replay records).
    Node,
    Testing,
}

/// Serializes writers ahead of the LMDB writer lock and remembers the
/// current holder for diagnostics.
pub struct WriteQueue {
    current: Mutex<Option<Writer>>,
    released: Condvar,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    /// Block until the queue is free, then mark `writer` as the holder.
    pub fn acquire(self: &Arc<Self>, writer: Writer) -> WriteGuard {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        while current.is_some() {
            current = self
                .released
                .wait(current)
                .unwrap_or_else(|e| e.into_inner());
        }
        *current = Some(writer);
        WriteGuard {
            queue: Arc::clone(self),
        }
    }

    /// The writer currently holding the lock, if any.
    pub fn current_writer(&self) -> Option<Writer> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = None;
        self.released.notify_one();
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII token for a slot in the write queue.
pub struct WriteGuard {
    queue: Arc<WriteQueue>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.queue.release();
    }
}

/// A read transaction. Many may run concurrently with one writer.
pub struct ReadTransaction<'env> {
    txn: RoTxn<'env>,
}

impl<'env> ReadTransaction<'env> {
    pub(crate) fn new(txn: RoTxn<'env>) -> Self {
        Self { txn }
    }

    pub fn raw(&self) -> &RoTxn<'env> {
        &self.txn
    }
}

/// A write transaction holding both the LMDB writer lock and a slot in the
/// process-wide write queue. Dropping without [`commit`](Self::commit)
/// aborts all changes.
pub struct WriteTransaction<'env> {
    // Declaration order matters: the LMDB transaction must be torn down
    // before the queue slot is released.
    txn: RwTxn<'env>,
    _guard: WriteGuard,
}

impl<'env> WriteTransaction<'env> {
    pub(crate) fn new(txn: RwTxn<'env>, guard: WriteGuard) -> Self {
        Self { txn, _guard: guard }
    }

    /// Read view of this transaction — sees its own uncommitted writes.
    pub fn raw(&self) -> &RoTxn<'env> {
        &self.txn
    }

    pub fn raw_mut(&mut self) -> &mut RwTxn<'env> {
        &mut self.txn
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }
}
