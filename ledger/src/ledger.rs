//! The ledger — single authority for applying blocks to persistent state.
//!
//! `process` validates one block against the store and, on success, commits
//! the block row, sideband, account info, frontier, pending and
//! representative-weight updates inside the caller's write transaction.
//! `rollback` unwinds uncemented blocks from a chain head, cascading into
//! dependent chains where a rolled-back send has already been received.

use std::sync::Arc;

use weave_store::RoTxn;

use weave_blocks::{
    Block, BlockSideband, BlockType, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock,
};
use weave_store::{
    AccountInfo, ConfirmationHeightInfo, PendingInfo, PendingKey, Store, StoreError,
    WriteTransaction, Writer,
};
use weave_types::{Account, Amount, BlockHash, Epoch, Link, PublicKey, Timestamp};
use weave_work::{validate_work, WorkBlockKind};

use crate::genesis::LedgerConstants;
use crate::rep_weights::RepWeights;
use crate::result::{ProcessResult, RollbackError};

/// Hard bound on cascading rollback recursion.
const ROLLBACK_MAX_DEPTH: usize = 1024;

/// Inferred operation of a state block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StateSubtype {
    Send,
    Receive,
    Change,
    Epoch,
}

/// Infer the state subtype from the balance delta and link semantics.
fn state_subtype(block: &StateBlock, previous_balance: Amount, epoch_link: &Link) -> StateSubtype {
    if block.balance < previous_balance {
        StateSubtype::Send
    } else if block.link.is_zero() {
        StateSubtype::Change
    } else if block.balance == previous_balance && block.link == *epoch_link {
        StateSubtype::Epoch
    } else {
        StateSubtype::Receive
    }
}

pub struct Ledger {
    store: Arc<Store>,
    constants: LedgerConstants,
    rep_weights: RepWeights,
}

impl Ledger {
    /// Open the ledger over `store`, seeding the genesis block into an empty
    /// store and rebuilding the representative weight cache.
    pub fn new(store: Arc<Store>, constants: LedgerConstants) -> Result<Self, StoreError> {
        let ledger = Self {
            store,
            constants,
            rep_weights: RepWeights::new(),
        };

        let needs_genesis = {
            let txn = ledger.store.tx_begin_read()?;
            ledger.store.account.count(txn.raw())? == 0
        };
        if needs_genesis {
            ledger.seed_genesis()?;
        }
        ledger.rebuild_rep_weights()?;
        Ok(ledger)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn constants(&self) -> &LedgerConstants {
        &self.constants
    }

    fn seed_genesis(&self) -> Result<(), StoreError> {
        let genesis = &self.constants.genesis_block;
        let account = self.constants.genesis_account;
        let hash = genesis.hash();
        let now = Timestamp::now();

        let mut txn = self.store.tx_begin_write(Writer::Testing)?;
        let sideband = BlockSideband::new(
            BlockType::Open,
            account,
            Amount::MAX_SUPPLY,
            1,
            BlockHash::ZERO,
            now,
        );
        self.store.block.put(
            txn.raw_mut(),
            &hash,
            &Block::Open(genesis.clone()),
            &sideband,
            Epoch::Epoch0,
        )?;
        let info = AccountInfo {
            head: hash,
            open_block: hash,
            representative_block: hash,
            balance: Amount::MAX_SUPPLY,
            modified: now,
            block_count: 1,
            epoch: Epoch::Epoch0,
        };
        self.store.account.put(txn.raw_mut(), &account, &info)?;
        self.store.frontier.put(txn.raw_mut(), &hash, &account)?;
        // Genesis is cemented by definition.
        self.store.confirmation_height.put(
            txn.raw_mut(),
            &account,
            &ConfirmationHeightInfo { height: 1, frontier: hash },
        )?;
        txn.commit()?;
        tracing::info!(%account, %hash, "seeded genesis block");
        Ok(())
    }

    fn rebuild_rep_weights(&self) -> Result<(), StoreError> {
        let txn = self.store.tx_begin_read()?;
        for entry in self.store.account.iter(txn.raw())? {
            let (_, info) = entry?;
            if let Some(rep) = self.representative_of(txn.raw(), &info)? {
                self.rep_weights.add(&rep, info.balance);
            }
        }
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Balance of the account after block `hash`.
    pub fn balance(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Amount>, StoreError> {
        self.store.block.balance(txn, hash)
    }

    /// Value moved by block `hash` (zero for change and epoch blocks).
    pub fn amount(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Amount>, StoreError> {
        let Some(stored) = self.store.block.get(txn, hash)? else {
            return Ok(None);
        };
        let previous = stored.block.previous();
        let previous_balance = if previous.is_zero() {
            Amount::ZERO
        } else {
            match self.store.block.balance(txn, &previous)? {
                Some(balance) => balance,
                None => return Ok(None),
            }
        };
        let balance = stored.sideband.balance;
        Ok(Some(if balance > previous_balance {
            balance - previous_balance
        } else {
            previous_balance - balance
        }))
    }

    /// Voting weight delegated to `representative`.
    pub fn weight(&self, representative: &Account) -> Amount {
        self.rep_weights.get(representative)
    }

    /// Head block of `account`, if the account exists.
    pub fn latest(&self, txn: &RoTxn, account: &Account) -> Result<Option<BlockHash>, StoreError> {
        Ok(self.store.account.get(txn, account)?.map(|info| info.head))
    }

    /// The account owning the chain that contains `hash`.
    pub fn account(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        self.store.block.account(txn, hash)
    }

    /// Whether `link` marks an epoch upgrade.
    pub fn is_epoch_link(&self, link: &Link) -> bool {
        *link == self.constants.epoch_link
    }

    /// The only account allowed to sign epoch upgrade blocks.
    pub fn epoch_signer(&self) -> Account {
        self.constants.epoch_signer
    }

    /// Whether a send is moving funds to a recipient this node considers
    /// receivable (used by observers; zero destinations are burns).
    pub fn is_send(&self, txn: &RoTxn, hash: &BlockHash) -> Result<bool, StoreError> {
        let Some(stored) = self.store.block.get(txn, hash)? else {
            return Ok(false);
        };
        Ok(match &stored.block {
            Block::Send(_) => true,
            Block::State(state) => {
                let previous = state.previous;
                if previous.is_zero() {
                    false
                } else {
                    match self.store.block.balance(txn, &previous)? {
                        Some(previous_balance) => state.balance < previous_balance,
                        None => false,
                    }
                }
            }
            _ => false,
        })
    }

    /// The representative currently named by an account's chain.
    pub fn representative_of(
        &self,
        txn: &RoTxn,
        info: &AccountInfo,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .store
            .block
            .get(txn, &info.representative_block)?
            .and_then(|stored| stored.block.representative()))
    }

    /// Walk back from `hash` to the nearest block that names a
    /// representative; returns that block's hash.
    fn representative_block(&self, txn: &RoTxn, hash: &BlockHash) -> Result<BlockHash, StoreError> {
        let mut current = *hash;
        while !current.is_zero() {
            let Some(stored) = self.store.block.get(txn, &current)? else {
                break;
            };
            if stored.block.representative().is_some() {
                return Ok(current);
            }
            current = stored.block.previous();
        }
        Ok(BlockHash::ZERO)
    }

    fn any_pending(&self, txn: &RoTxn, account: &Account) -> Result<bool, StoreError> {
        let mut iter = self.store.pending.iter_account(txn, *account)?;
        match iter.next() {
            Some(Ok(_)) => Ok(true),
            Some(Err(error)) => Err(error),
            None => Ok(false),
        }
    }

    fn verify(&self, hash: &BlockHash, signature: &weave_types::Signature, signer: &Account) -> bool {
        weave_crypto::verify_signature(hash.as_bytes(), signature, &PublicKey::from(*signer))
    }

    fn work_valid(&self, block: &Block, kind: WorkBlockKind) -> bool {
        let threshold = self.constants.work_thresholds.threshold_for(kind);
        validate_work(&block.root(), block.work(), threshold)
    }

    // ── Process ─────────────────────────────────────────────────────────

    /// Validate and apply one block. Recoverable outcomes are returned as
    /// [`ProcessResult`] values; only store I/O failures are `Err`.
    pub fn process(
        &self,
        txn: &mut WriteTransaction,
        block: &Block,
    ) -> Result<ProcessResult, StoreError> {
        match block {
            Block::State(state) => self.process_state(txn, state),
            Block::Send(send) => self.process_send(txn, send),
            Block::Receive(receive) => self.process_receive(txn, receive),
            Block::Open(open) => self.process_open(txn, open),
            Block::Change(change) => self.process_change(txn, change),
        }
    }

    fn process_state(
        &self,
        txn: &mut WriteTransaction,
        block: &StateBlock,
    ) -> Result<ProcessResult, StoreError> {
        let wrapped = Block::State(block.clone());
        if !self.work_valid(&wrapped, WorkBlockKind::Base) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let hash = block.hash();

        // The hash does not cover the signature bytes, so the signature is
        // checked before the duplicate lookup: a resubmission carrying a
        // forged signature must surface as `BadSignature`, not `Old`.
        let account = block.account;
        let epoch_candidate = self.is_epoch_link(&block.link);
        // For epoch-link blocks the epoch signer takes precedence in the
        // epoch arm below: the genesis account upgrades itself with the
        // same key. Value-moving subtypes always require the account's own
        // signature.
        let signed_by_epoch_signer = epoch_candidate
            && self.verify(&hash, &block.signature, &self.constants.epoch_signer);
        let signed_by_account = self.verify(&hash, &block.signature, &account);
        if !signed_by_account && !signed_by_epoch_signer {
            return Ok(ProcessResult::BadSignature);
        }

        if self.store.block.exists(txn.raw(), &hash)? {
            return Ok(ProcessResult::Old);
        }

        let info = self.store.account.get(txn.raw(), &account)?;
        let previous_balance = match (&info, block.previous.is_zero()) {
            (Some(_), true) => return Ok(ProcessResult::Fork),
            (Some(info), false) => {
                if !self.store.block.exists(txn.raw(), &block.previous)? {
                    return Ok(ProcessResult::GapPrevious);
                }
                if info.head != block.previous {
                    return Ok(ProcessResult::Fork);
                }
                info.balance
            }
            (None, false) => return Ok(ProcessResult::GapPrevious),
            (None, true) => Amount::ZERO,
        };

        let mut new_epoch = info.as_ref().map(|i| i.epoch).unwrap_or_default();
        let mut consumed_pending: Option<PendingKey> = None;

        let subtype = state_subtype(block, previous_balance, &self.constants.epoch_link);
        match subtype {
            StateSubtype::Send => {
                if !signed_by_account {
                    return Ok(ProcessResult::BadSignature);
                }
            }
            StateSubtype::Change => {
                if block.balance != previous_balance {
                    return Ok(ProcessResult::BalanceMismatch);
                }
                if info.is_none() {
                    return Ok(ProcessResult::BlockPosition);
                }
                if !signed_by_account {
                    return Ok(ProcessResult::BadSignature);
                }
            }
            StateSubtype::Epoch => {
                if !signed_by_epoch_signer {
                    // Signed only by the owner, this degenerates to a
                    // representative change with zero effect.
                    if info.is_none() {
                        return Ok(ProcessResult::BlockPosition);
                    }
                } else {
                    match &info {
                        Some(info) => {
                            let current_rep =
                                self.representative_of(txn.raw(), info)?.unwrap_or(Account::ZERO);
                            if block.representative != current_rep {
                                return Ok(ProcessResult::BlockPosition);
                            }
                            new_epoch = match info.epoch.successor() {
                                Some(next) => next,
                                None => return Ok(ProcessResult::BlockPosition),
                            };
                        }
                        None => {
                            // Epoch-open: allowed only for accounts with
                            // something pending, and without smuggling in a
                            // representative.
                            if block.representative != Account::ZERO {
                                return Ok(ProcessResult::BlockPosition);
                            }
                            if !self.any_pending(txn.raw(), &account)? {
                                return Ok(ProcessResult::GapSource);
                            }
                            new_epoch = Epoch::Epoch1;
                        }
                    }
                }
            }
            StateSubtype::Receive => {
                if block.balance == previous_balance {
                    return Ok(ProcessResult::BalanceMismatch);
                }
                if !signed_by_account {
                    return Ok(ProcessResult::BadSignature);
                }
                let source = block.link.as_block_hash();
                if !self.store.block.exists(txn.raw(), &source)? {
                    return Ok(ProcessResult::GapSource);
                }
                let key = PendingKey::new(account, source);
                let Some(pending) = self.store.pending.get(txn.raw(), &key)? else {
                    return Ok(ProcessResult::Unreceivable);
                };
                let amount = block.balance - previous_balance;
                if amount != pending.amount {
                    return Ok(ProcessResult::BalanceMismatch);
                }
                consumed_pending = Some(key);
            }
        }

        // All checks passed — commit the block and its bookkeeping.
        let now = Timestamp::now();
        let height = info.as_ref().map(|i| i.block_count).unwrap_or(0) + 1;
        let sideband =
            BlockSideband::new(BlockType::State, account, block.balance, height, BlockHash::ZERO, now);
        self.store
            .block
            .put(txn.raw_mut(), &hash, &wrapped, &sideband, new_epoch)?;
        if !block.previous.is_zero() {
            self.store
                .block
                .put_successor(txn.raw_mut(), &block.previous, &hash)?;
        }

        if subtype == StateSubtype::Send {
            let amount = previous_balance - block.balance;
            let key = PendingKey::new(block.link.as_account(), hash);
            let pending = PendingInfo {
                source: account,
                amount,
                epoch: new_epoch,
            };
            self.store.pending.put(txn.raw_mut(), &key, &pending)?;
        }
        if let Some(key) = consumed_pending {
            self.store.pending.del(txn.raw_mut(), &key)?;
        }

        let old_rep = match &info {
            Some(info) => self.representative_of(txn.raw(), info)?,
            None => None,
        };
        if let Some(old_rep) = old_rep {
            self.rep_weights.subtract(&old_rep, previous_balance);
        }
        if !block.representative.is_zero() {
            self.rep_weights.add(&block.representative, block.balance);
        }

        let new_info = AccountInfo {
            head: hash,
            open_block: info.as_ref().map(|i| i.open_block).unwrap_or(hash),
            representative_block: hash,
            balance: block.balance,
            modified: now,
            block_count: height,
            epoch: new_epoch,
        };
        self.store.account.put(txn.raw_mut(), &account, &new_info)?;

        if let Some(info) = &info {
            self.store.frontier.del(txn.raw_mut(), &info.head)?;
        }
        self.store.frontier.put(txn.raw_mut(), &hash, &account)?;
        Ok(ProcessResult::Progress)
    }

    /// Shared prologue for legacy non-open blocks: resolve the previous
    /// block, its account, verify the signature and detect forks.
    ///
    /// The signer of a legacy block is only knowable from its previous
    /// block, so the gap lookup comes first; after that the signature is
    /// verified before the duplicate check so a resubmission with a forged
    /// signature surfaces as `BadSignature`, not `Old`.
    fn legacy_prologue(
        &self,
        txn: &WriteTransaction,
        hash: &BlockHash,
        previous: &BlockHash,
        signature: &weave_types::Signature,
    ) -> Result<Result<(Account, AccountInfo), ProcessResult>, StoreError> {
        let Some(previous_stored) = self.store.block.get(txn.raw(), previous)? else {
            return Ok(Err(ProcessResult::GapPrevious));
        };
        let account = previous_stored.sideband.account;
        if !self.verify(hash, signature, &account) {
            return Ok(Err(ProcessResult::BadSignature));
        }
        if self.store.block.exists(txn.raw(), hash)? {
            return Ok(Err(ProcessResult::Old));
        }
        let Some(info) = self.store.account.get(txn.raw(), &account)? else {
            return Ok(Err(ProcessResult::GapPrevious));
        };
        if info.head != *previous {
            return Ok(Err(ProcessResult::Fork));
        }
        if info.epoch != Epoch::Epoch0 {
            // Upgraded accounts only accept state blocks.
            return Ok(Err(ProcessResult::BlockPosition));
        }
        Ok(Ok((account, info)))
    }

    /// Common tail for legacy appends: block row, successor patch, account
    /// info and frontier swap.
    #[allow(clippy::too_many_arguments)]
    fn legacy_commit(
        &self,
        txn: &mut WriteTransaction,
        block: &Block,
        hash: &BlockHash,
        account: &Account,
        info: &AccountInfo,
        balance: Amount,
        representative_block: BlockHash,
    ) -> Result<(), StoreError> {
        let now = Timestamp::now();
        let height = info.block_count + 1;
        let sideband = BlockSideband::new(
            block.block_type(),
            *account,
            balance,
            height,
            BlockHash::ZERO,
            now,
        );
        self.store
            .block
            .put(txn.raw_mut(), hash, block, &sideband, Epoch::Epoch0)?;
        self.store
            .block
            .put_successor(txn.raw_mut(), &block.previous(), hash)?;
        let new_info = AccountInfo {
            head: *hash,
            open_block: info.open_block,
            representative_block,
            balance,
            modified: now,
            block_count: height,
            epoch: Epoch::Epoch0,
        };
        self.store.account.put(txn.raw_mut(), account, &new_info)?;
        self.store.frontier.del(txn.raw_mut(), &info.head)?;
        self.store.frontier.put(txn.raw_mut(), hash, account)?;
        Ok(())
    }

    fn process_send(
        &self,
        txn: &mut WriteTransaction,
        block: &SendBlock,
    ) -> Result<ProcessResult, StoreError> {
        let wrapped = Block::Send(block.clone());
        if !self.work_valid(&wrapped, WorkBlockKind::Base) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let hash = block.hash();
        let (account, info) =
            match self.legacy_prologue(txn, &hash, &block.previous, &block.signature)? {
                Ok(resolved) => resolved,
                Err(result) => return Ok(result),
            };

        if block.balance >= info.balance {
            return Ok(ProcessResult::NegativeSpend);
        }
        let amount = info.balance - block.balance;

        let rep_block = info.representative_block;
        self.legacy_commit(txn, &wrapped, &hash, &account, &info, block.balance, rep_block)?;
        self.store.pending.put(
            txn.raw_mut(),
            &PendingKey::new(block.destination, hash),
            &PendingInfo {
                source: account,
                amount,
                epoch: Epoch::Epoch0,
            },
        )?;
        if let Some(rep) = self.representative_of(txn.raw(), &info)? {
            self.rep_weights.subtract(&rep, amount);
        }
        Ok(ProcessResult::Progress)
    }

    fn process_receive(
        &self,
        txn: &mut WriteTransaction,
        block: &ReceiveBlock,
    ) -> Result<ProcessResult, StoreError> {
        let wrapped = Block::Receive(block.clone());
        if !self.work_valid(&wrapped, WorkBlockKind::ReceiveOrOpen) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let hash = block.hash();
        let (account, info) =
            match self.legacy_prologue(txn, &hash, &block.previous, &block.signature)? {
                Ok(resolved) => resolved,
                Err(result) => return Ok(result),
            };

        if !self.store.block.exists(txn.raw(), &block.source)? {
            return Ok(ProcessResult::GapSource);
        }
        let key = PendingKey::new(account, block.source);
        let Some(pending) = self.store.pending.get(txn.raw(), &key)? else {
            return Ok(ProcessResult::Unreceivable);
        };
        if pending.epoch != Epoch::Epoch0 {
            // An epoch-1 pending entry must be received with a state block.
            return Ok(ProcessResult::Unreceivable);
        }
        let balance = match info.balance.checked_add(pending.amount) {
            Some(balance) => balance,
            None => return Ok(ProcessResult::BalanceMismatch),
        };

        let rep_block = info.representative_block;
        self.legacy_commit(txn, &wrapped, &hash, &account, &info, balance, rep_block)?;
        self.store.pending.del(txn.raw_mut(), &key)?;
        if let Some(rep) = self.representative_of(txn.raw(), &info)? {
            self.rep_weights.add(&rep, pending.amount);
        }
        Ok(ProcessResult::Progress)
    }

    fn process_open(
        &self,
        txn: &mut WriteTransaction,
        block: &OpenBlock,
    ) -> Result<ProcessResult, StoreError> {
        let wrapped = Block::Open(block.clone());
        if !self.work_valid(&wrapped, WorkBlockKind::ReceiveOrOpen) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let hash = block.hash();
        // Signature before the duplicate lookup; see `process_state`.
        let account = block.account;
        if !self.verify(&hash, &block.signature, &account) {
            return Ok(ProcessResult::BadSignature);
        }
        if self.store.block.exists(txn.raw(), &hash)? {
            return Ok(ProcessResult::Old);
        }
        if self.store.account.get(txn.raw(), &account)?.is_some() {
            return Ok(ProcessResult::Fork);
        }
        if !self.store.block.exists(txn.raw(), &block.source)? {
            return Ok(ProcessResult::GapSource);
        }
        let key = PendingKey::new(account, block.source);
        let Some(pending) = self.store.pending.get(txn.raw(), &key)? else {
            return Ok(ProcessResult::Unreceivable);
        };
        if pending.epoch != Epoch::Epoch0 {
            return Ok(ProcessResult::Unreceivable);
        }

        let now = Timestamp::now();
        let sideband = BlockSideband::new(
            BlockType::Open,
            account,
            pending.amount,
            1,
            BlockHash::ZERO,
            now,
        );
        self.store
            .block
            .put(txn.raw_mut(), &hash, &wrapped, &sideband, Epoch::Epoch0)?;
        self.store.pending.del(txn.raw_mut(), &key)?;
        let info = AccountInfo {
            head: hash,
            open_block: hash,
            representative_block: hash,
            balance: pending.amount,
            modified: now,
            block_count: 1,
            epoch: Epoch::Epoch0,
        };
        self.store.account.put(txn.raw_mut(), &account, &info)?;
        self.store.frontier.put(txn.raw_mut(), &hash, &account)?;
        self.rep_weights.add(&block.representative, pending.amount);
        Ok(ProcessResult::Progress)
    }

    fn process_change(
        &self,
        txn: &mut WriteTransaction,
        block: &ChangeBlock,
    ) -> Result<ProcessResult, StoreError> {
        let wrapped = Block::Change(block.clone());
        if !self.work_valid(&wrapped, WorkBlockKind::Base) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let hash = block.hash();
        let (account, info) =
            match self.legacy_prologue(txn, &hash, &block.previous, &block.signature)? {
                Ok(resolved) => resolved,
                Err(result) => return Ok(result),
            };

        let old_rep = self.representative_of(txn.raw(), &info)?;
        self.legacy_commit(txn, &wrapped, &hash, &account, &info, info.balance, hash)?;
        if let Some(old_rep) = old_rep {
            self.rep_weights.subtract(&old_rep, info.balance);
        }
        self.rep_weights.add(&block.representative, info.balance);
        Ok(ProcessResult::Progress)
    }

    // ── Rollback ────────────────────────────────────────────────────────

    /// Unwind everything from the owning account's head down to and
    /// including `hash`. Fails without touching the store if any block in
    /// that range is cemented. Cascades into chains that already received a
    /// rolled-back send. Returns the rolled-back hashes, newest first.
    pub fn rollback(
        &self,
        txn: &mut WriteTransaction,
        hash: &BlockHash,
    ) -> Result<Vec<BlockHash>, RollbackError> {
        let mut rolled = Vec::new();
        self.rollback_to(txn, hash, &mut rolled, 0)?;
        Ok(rolled)
    }

    fn rollback_to(
        &self,
        txn: &mut WriteTransaction,
        target: &BlockHash,
        rolled: &mut Vec<BlockHash>,
        depth: usize,
    ) -> Result<(), RollbackError> {
        if depth > ROLLBACK_MAX_DEPTH {
            return Err(RollbackError::Store(StoreError::Backend(
                "rollback recursion limit exceeded".into(),
            )));
        }
        let Some(stored) = self.store.block.get(txn.raw(), target)? else {
            if rolled.contains(target) {
                // Already unwound by a cascading rollback above us.
                return Ok(());
            }
            return Err(RollbackError::BlockNotFound(*target));
        };
        let account = stored.sideband.account;
        let confirmation_height = self
            .store
            .confirmation_height
            .get(txn.raw(), &account)?
            .map(|info| info.height)
            .unwrap_or(0);
        if stored.sideband.height <= confirmation_height {
            return Err(RollbackError::Cemented {
                hash: *target,
                height: stored.sideband.height,
                confirmation_height,
            });
        }

        loop {
            let Some(info) = self.store.account.get(txn.raw(), &account)? else {
                return Err(RollbackError::BlockNotFound(*target));
            };
            let head_hash = info.head;
            self.undo_head(txn, &account, &info, rolled, depth)?;
            rolled.push(head_hash);
            if head_hash == *target {
                return Ok(());
            }
        }
    }

    /// Undo the single block at `info.head`.
    fn undo_head(
        &self,
        txn: &mut WriteTransaction,
        account: &Account,
        info: &AccountInfo,
        rolled: &mut Vec<BlockHash>,
        depth: usize,
    ) -> Result<(), RollbackError> {
        let head_hash = info.head;
        let Some(stored) = self.store.block.get(txn.raw(), &head_hash)? else {
            return Err(RollbackError::BlockNotFound(head_hash));
        };
        let block = stored.block.clone();
        let previous = block.previous();
        let previous_balance = if previous.is_zero() {
            Amount::ZERO
        } else {
            self.store
                .block
                .balance(txn.raw(), &previous)?
                .ok_or(RollbackError::BlockNotFound(previous))?
        };
        let balance = stored.sideband.balance;

        // Undo value movement.
        match &block {
            Block::Send(send) => {
                let key = PendingKey::new(send.destination, head_hash);
                self.undo_send(txn, &key, rolled, depth)?;
            }
            Block::Receive(receive) => {
                self.restore_pending(txn, account, &receive.source, balance - previous_balance)?;
            }
            Block::Open(open) => {
                self.restore_pending(txn, account, &open.source, balance)?;
            }
            Block::Change(_) => {}
            Block::State(state) => {
                match state_subtype(state, previous_balance, &self.constants.epoch_link) {
                    StateSubtype::Send => {
                        let key = PendingKey::new(state.link.as_account(), head_hash);
                        self.undo_send(txn, &key, rolled, depth)?;
                    }
                    StateSubtype::Receive => {
                        let source = state.link.as_block_hash();
                        self.restore_pending(txn, account, &source, balance - previous_balance)?;
                    }
                    StateSubtype::Change | StateSubtype::Epoch => {}
                }
            }
        }

        // Undo representative weight movement.
        let rep_after = self.representative_of(txn.raw(), info)?;
        if let Some(rep) = rep_after {
            self.rep_weights.subtract(&rep, balance);
        }

        // Remove the block row and restore chain metadata.
        self.store.block.del(txn.raw_mut(), &head_hash)?;
        self.store.frontier.del(txn.raw_mut(), &head_hash)?;

        if previous.is_zero() {
            // The open block itself is gone; so is the account.
            self.store.account.del(txn.raw_mut(), account)?;
            self.store.confirmation_height.del(txn.raw_mut(), account)?;
        } else {
            self.store
                .block
                .put_successor(txn.raw_mut(), &previous, &BlockHash::ZERO)?;
            let rep_block = self.representative_block(txn.raw(), &previous)?;
            let previous_epoch = match &block {
                Block::State(state)
                    if state_subtype(state, previous_balance, &self.constants.epoch_link)
                        == StateSubtype::Epoch =>
                {
                    self.store
                        .block
                        .block_epoch(txn.raw(), &previous)?
                        .unwrap_or(Epoch::Epoch0)
                }
                _ => info.epoch,
            };
            let new_info = AccountInfo {
                head: previous,
                open_block: info.open_block,
                representative_block: rep_block,
                balance: previous_balance,
                modified: Timestamp::now(),
                block_count: info.block_count - 1,
                epoch: previous_epoch,
            };
            self.store.account.put(txn.raw_mut(), account, &new_info)?;
            self.store.frontier.put(txn.raw_mut(), &previous, account)?;
            if let Some(rep) = self
                .store
                .block
                .get(txn.raw(), &rep_block)?
                .and_then(|stored| stored.block.representative())
            {
                self.rep_weights.add(&rep, previous_balance);
            }
        }
        Ok(())
    }

    /// Delete the pending entry created by a send being rolled back. If the
    /// entry has already been consumed, the consuming chain is rolled back
    /// first so the entry reappears.
    fn undo_send(
        &self,
        txn: &mut WriteTransaction,
        key: &PendingKey,
        rolled: &mut Vec<BlockHash>,
        depth: usize,
    ) -> Result<(), RollbackError> {
        while self.store.pending.get(txn.raw(), key)?.is_none() {
            let Some(receiver_head) = self.latest(txn.raw(), &key.destination)? else {
                // Burn destination or never received; nothing to undo.
                return Ok(());
            };
            self.rollback_to(txn, &receiver_head, rolled, depth + 1)?;
        }
        self.store.pending.del(txn.raw_mut(), key)?;
        Ok(())
    }

    /// Re-create the pending entry consumed by a receive being rolled back.
    fn restore_pending(
        &self,
        txn: &mut WriteTransaction,
        account: &Account,
        source: &BlockHash,
        amount: Amount,
    ) -> Result<(), RollbackError> {
        let source_account = self
            .store
            .block
            .account(txn.raw(), source)?
            .ok_or(RollbackError::BlockNotFound(*source))?;
        let epoch = self
            .store
            .block
            .block_epoch(txn.raw(), source)?
            .unwrap_or(Epoch::Epoch0);
        self.store.pending.put(
            txn.raw_mut(),
            &PendingKey::new(*account, *source),
            &PendingInfo {
                source: source_account,
                amount,
                epoch,
            },
        )?;
        Ok(())
    }
}
