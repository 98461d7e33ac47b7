//! Bootstrap server — serves bulk_pull, bulk_pull_account, frontier_req and
//! bulk_push on one incoming TCP connection.
//!
//! The response builders are synchronous and return complete byte buffers,
//! which keeps them testable without sockets; the async connection loop is
//! a thin shell around them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use weave_blocks::{Block, BlockType};
use weave_ledger::Ledger;
use weave_messages::{BulkPull, BulkPullAccount, BulkPullAccountFlags, FrontierReq, Message};
use weave_store::StoreError;
use weave_types::{Account, Amount, BlockHash, NetworkId, Timestamp};

use crate::bootstrap::read_typed_block;
use crate::NodeError;

/// Idle connections are dropped after this long without a request.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BootstrapServer {
    ledger: Arc<Ledger>,
    network: NetworkId,
    /// Live incoming connections, bounded by `tcp_incoming_connections_max`.
    connections: AtomicUsize,
    max_connections: usize,
}

impl BootstrapServer {
    pub fn new(ledger: Arc<Ledger>, network: NetworkId, max_connections: usize) -> Self {
        Self {
            ledger,
            network,
            connections: AtomicUsize::new(0),
            max_connections,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Serve one connection until it goes idle, closes, or errors.
    /// `on_push_block` receives blocks streamed by a bulk_push.
    pub async fn serve<S>(
        &self,
        stream: S,
        on_push_block: impl Fn(Block),
    ) -> Result<(), NodeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.connections.fetch_add(1, Ordering::SeqCst) >= self.max_connections {
            self.connections.fetch_sub(1, Ordering::SeqCst);
            return Err(NodeError::Bootstrap("too many bootstrap connections".into()));
        }
        let result = self.serve_inner(stream, on_push_block).await;
        self.connections.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn serve_inner<S>(
        &self,
        mut stream: S,
        on_push_block: impl Fn(Block),
    ) -> Result<(), NodeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let (_, message) = match timeout(
                IDLE_TIMEOUT,
                weave_network::read_message(&mut stream, self.network),
            )
            .await
            {
                Ok(Ok(message)) => message,
                // Idle timeout or peer hangup both end the connection.
                Ok(Err(_)) | Err(_) => return Ok(()),
            };

            match message {
                Message::BulkPull(request) => {
                    let response = self.bulk_pull_response(&request)?;
                    stream.write_all(&response).await?;
                }
                Message::BulkPullAccount(request) => {
                    let response = self.bulk_pull_account_response(&request)?;
                    stream.write_all(&response).await?;
                }
                Message::FrontierReq(request) => {
                    let response = self.frontier_response(&request)?;
                    stream.write_all(&response).await?;
                }
                Message::BulkPush => {
                    while let Some(block) = read_typed_block(&mut stream).await? {
                        on_push_block(block);
                    }
                }
                Message::Keepalive(_) => continue,
                other => {
                    tracing::debug!(?other, "unexpected message on bootstrap connection");
                    return Ok(());
                }
            }
        }
    }

    /// Stream blocks from `start` (a hash, or an account whose head is
    /// used) back toward `end` or the chain base, newest first, capped by
    /// `count`, terminated by `not_a_block`.
    pub fn bulk_pull_response(&self, request: &BulkPull) -> Result<Vec<u8>, StoreError> {
        let store = self.ledger.store();
        let txn = store.tx_begin_read()?;

        let start_hash = BlockHash::new(request.start);
        let mut current = if store.block.exists(txn.raw(), &start_hash)? {
            start_hash
        } else {
            let account = Account::new(request.start);
            store
                .account
                .get(txn.raw(), &account)?
                .map(|info| info.head)
                .unwrap_or(BlockHash::ZERO)
        };

        let mut buffer = Vec::new();
        let mut sent: u32 = 0;
        while !current.is_zero() {
            if request.count != 0 && sent >= request.count {
                break;
            }
            let Some(stored) = store.block.get(txn.raw(), &current)? else {
                break;
            };
            stored.block.serialize_with_type(&mut buffer);
            sent += 1;
            if current == request.end {
                break;
            }
            current = stored.block.previous();
        }
        buffer.push(BlockType::NotABlock.as_u8());
        Ok(buffer)
    }

    /// `(frontier, balance)` then pending entries at or above the minimum
    /// amount, rendered per the request flags, with a zero terminator of
    /// the matching width.
    pub fn bulk_pull_account_response(
        &self,
        request: &BulkPullAccount,
    ) -> Result<Vec<u8>, StoreError> {
        let store = self.ledger.store();
        let txn = store.tx_begin_read()?;

        let (frontier, balance) = match store.account.get(txn.raw(), &request.account)? {
            Some(info) => (info.head, info.balance),
            None => (BlockHash::ZERO, Amount::ZERO),
        };
        let mut buffer = Vec::new();
        buffer.extend_from_slice(frontier.as_bytes());
        buffer.extend_from_slice(&balance.to_be_bytes());

        for entry in store.pending.iter_account(txn.raw(), request.account)? {
            let (key, info) = entry?;
            if info.amount < request.minimum_amount {
                continue;
            }
            match request.flags {
                BulkPullAccountFlags::PendingHashAndAmount => {
                    buffer.extend_from_slice(key.send_hash.as_bytes());
                    buffer.extend_from_slice(&info.amount.to_be_bytes());
                }
                BulkPullAccountFlags::PendingAddressOnly => {
                    buffer.extend_from_slice(info.source.as_bytes());
                }
                BulkPullAccountFlags::PendingHashAmountAndAddress => {
                    buffer.extend_from_slice(key.send_hash.as_bytes());
                    buffer.extend_from_slice(&info.amount.to_be_bytes());
                    buffer.extend_from_slice(info.source.as_bytes());
                }
            }
        }

        // Terminator: zeros of the entry width.
        let terminator_len = match request.flags {
            BulkPullAccountFlags::PendingHashAndAmount => 48,
            BulkPullAccountFlags::PendingAddressOnly => 32,
            BulkPullAccountFlags::PendingHashAmountAndAddress => 80,
        };
        buffer.extend(std::iter::repeat(0u8).take(terminator_len));
        Ok(buffer)
    }

    /// `(account, head)` pairs from `start` in account order, filtered by
    /// modification age, capped by count, terminated by 64 zero bytes.
    pub fn frontier_response(&self, request: &FrontierReq) -> Result<Vec<u8>, StoreError> {
        let store = self.ledger.store();
        let txn = store.tx_begin_read()?;
        let now = Timestamp::now();

        let mut buffer = Vec::new();
        let mut sent: u32 = 0;
        for entry in store.account.iter_from(txn.raw(), &request.start)? {
            if sent >= request.count {
                break;
            }
            let (account, info) = entry?;
            if request.age != u32::MAX && info.modified.elapsed_since(now) > request.age as u64 {
                continue;
            }
            buffer.extend_from_slice(account.as_bytes());
            buffer.extend_from_slice(info.head.as_bytes());
            sent += 1;
        }
        buffer.extend_from_slice(&[0u8; 64]);
        Ok(buffer)
    }
}
