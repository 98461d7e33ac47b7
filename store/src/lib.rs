//! Transactional LMDB-backed storage for the weave ledger.
//!
//! One environment holds every table; each logical store maps to one or two
//! LMDB databases. Reads run concurrently with a single writer, and writers
//! are linearized by an explicit [`WriteQueue`] that records which subsystem
//! currently holds the lock.

pub mod account;
pub mod block;
pub mod confirmation_height;
pub mod error;
pub mod frontier;
pub mod iterator;
pub mod meta;
pub mod migration;
pub mod online_weight;
pub mod peer;
pub mod pending;
pub mod transaction;
pub mod unchecked;
pub mod vote;

pub use account::{AccountInfo, AccountStore};
pub use block::{BlockStore, StoredBlock};
pub use confirmation_height::{ConfirmationHeightInfo, ConfirmationHeightStore};
pub use error::StoreError;
pub use frontier::FrontierStore;
pub use iterator::MergedIter;
pub use meta::MetaStore;
pub use migration::{Migrator, SCHEMA_VERSION};
pub use online_weight::OnlineWeightStore;
pub use peer::PeerStore;
pub use pending::{PendingInfo, PendingKey, PendingStore};
pub use transaction::{ReadTransaction, WriteGuard, WriteQueue, WriteTransaction, Writer};
pub use unchecked::{SignatureVerification, UncheckedInfo, UncheckedKey, UncheckedStore};
pub use vote::{StoredVote, VoteStore};

// The raw transaction types are part of the public API: component methods
// take them so reads work under either transaction kind.
pub use heed::{RoTxn, RwTxn};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::Arc;

type Db = Database<Bytes, Bytes>;

/// Default LMDB map size: 32 GiB of sparse address space.
const DEFAULT_MAP_SIZE: usize = 32 * 1024 * 1024 * 1024;

const MAX_DBS: u32 = 17;

/// The unified store wrapping the LMDB environment and all table components.
pub struct Store {
    env: Env,
    write_queue: Arc<WriteQueue>,
    pub account: AccountStore,
    pub block: BlockStore,
    pub pending: PendingStore,
    pub frontier: FrontierStore,
    pub unchecked: UncheckedStore,
    pub confirmation_height: ConfirmationHeightStore,
    pub online_weight: OnlineWeightStore,
    pub peer: PeerStore,
    pub vote: VoteStore,
    pub meta: MetaStore,
}

impl Store {
    /// Open (or create) the store at `path` with the default map size and
    /// run any pending schema migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: &Path, map_size: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("cannot create data dir: {e}")))?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut txn = env.write_txn()?;
        let accounts_v0: Db = env.create_database(&mut txn, Some("accounts_v0"))?;
        let accounts_v1: Db = env.create_database(&mut txn, Some("accounts_v1"))?;
        let pending_v0: Db = env.create_database(&mut txn, Some("pending_v0"))?;
        let pending_v1: Db = env.create_database(&mut txn, Some("pending_v1"))?;
        let send_blocks: Db = env.create_database(&mut txn, Some("send_blocks"))?;
        let receive_blocks: Db = env.create_database(&mut txn, Some("receive_blocks"))?;
        let open_blocks: Db = env.create_database(&mut txn, Some("open_blocks"))?;
        let change_blocks: Db = env.create_database(&mut txn, Some("change_blocks"))?;
        let state_blocks_v0: Db = env.create_database(&mut txn, Some("state_blocks_v0"))?;
        let state_blocks_v1: Db = env.create_database(&mut txn, Some("state_blocks_v1"))?;
        let frontiers: Db = env.create_database(&mut txn, Some("frontiers"))?;
        let unchecked: Db = env.create_database(&mut txn, Some("unchecked"))?;
        let vote: Db = env.create_database(&mut txn, Some("vote"))?;
        let online_weight: Db = env.create_database(&mut txn, Some("online_weight"))?;
        let peers: Db = env.create_database(&mut txn, Some("peers"))?;
        let confirmation_height: Db = env.create_database(&mut txn, Some("confirmation_height"))?;
        let meta: Db = env.create_database(&mut txn, Some("meta"))?;

        let meta_component = MetaStore::new(meta);
        Migrator::run(&meta_component, &mut txn)?;
        txn.commit()?;

        Ok(Self {
            env,
            write_queue: Arc::new(WriteQueue::new()),
            account: AccountStore::new(accounts_v0, accounts_v1),
            block: BlockStore::new(
                send_blocks,
                receive_blocks,
                open_blocks,
                change_blocks,
                state_blocks_v0,
                state_blocks_v1,
            ),
            pending: PendingStore::new(pending_v0, pending_v1),
            frontier: FrontierStore::new(frontiers),
            unchecked: UncheckedStore::new(unchecked),
            confirmation_height: ConfirmationHeightStore::new(confirmation_height),
            online_weight: OnlineWeightStore::new(online_weight),
            peer: PeerStore::new(peers),
            vote: VoteStore::new(vote),
            meta: meta_component,
        })
    }

    /// Begin a read transaction. Many may run concurrently.
    pub fn tx_begin_read(&self) -> Result<ReadTransaction<'_>, StoreError> {
        Ok(ReadTransaction::new(self.env.read_txn()?))
    }

    /// Begin a write transaction, waiting for the write queue. `writer`
    /// identifies the subsystem for diagnostics.
    pub fn tx_begin_write(&self, writer: Writer) -> Result<WriteTransaction<'_>, StoreError> {
        let guard = self.write_queue.acquire(writer);
        let txn = self.env.write_txn()?;
        Ok(WriteTransaction::new(txn, guard))
    }

    /// The subsystem currently holding the write lock, if any.
    pub fn current_writer(&self) -> Option<Writer> {
        self.write_queue.current_writer()
    }
}
