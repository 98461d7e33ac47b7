//! Bootstrap client — one connection's request/response driving.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use weave_blocks::{Block, BlockType};
use weave_messages::{
    BulkPull, BulkPullAccount, BulkPullAccountFlags, FrontierReq, Message,
};
use weave_types::{Account, Amount, BlockHash, NetworkId};

use crate::bootstrap::pulls::PullInfo;
use crate::bootstrap::read_typed_block;
use crate::NodeError;

/// Frontier streams slower than this (after warmup) abort the request.
const MIN_FRONTIERS_PER_SEC: f64 = 1000.0;
const FRONTIER_WARMUP_SECS: f64 = 5.0;

/// Hard cap on blocks accepted from one pull, to bound memory against a
/// malicious server.
const MAX_BLOCKS_PER_PULL: usize = 128 * 1024;

pub struct BootstrapClient<S> {
    stream: S,
    network: NetworkId,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BootstrapClient<S> {
    pub fn new(stream: S, network: NetworkId) -> Self {
        Self { stream, network }
    }

    async fn read_exact(&mut self, buffer: &mut [u8]) -> Result<(), NodeError> {
        use tokio::io::AsyncReadExt;
        self.stream.read_exact(buffer).await?;
        Ok(())
    }

    /// Stream the peer's full frontier set. Aborts when the peer feeds us
    /// slower than the minimum rate after warmup.
    pub async fn request_frontiers(
        &mut self,
        start: Account,
        age: u32,
        count: u32,
    ) -> Result<Vec<(Account, BlockHash)>, NodeError> {
        let request = Message::FrontierReq(FrontierReq { start, age, count });
        self.stream.write_all(&request.serialize(self.network)).await?;

        let started = Instant::now();
        let mut frontiers = Vec::new();
        let mut pair = [0u8; 64];
        loop {
            self.read_exact(&mut pair).await?;
            if pair.iter().all(|&byte| byte == 0) {
                break;
            }
            let mut account = [0u8; 32];
            let mut head = [0u8; 32];
            account.copy_from_slice(&pair[..32]);
            head.copy_from_slice(&pair[32..]);
            frontiers.push((Account::new(account), BlockHash::new(head)));

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > FRONTIER_WARMUP_SECS
                && (frontiers.len() as f64 / elapsed) < MIN_FRONTIERS_PER_SEC
            {
                return Err(NodeError::Bootstrap("frontier stream too slow".into()));
            }
        }
        Ok(frontiers)
    }

    /// Pull a chain; blocks arrive newest-first, terminated by
    /// `not_a_block`.
    pub async fn bulk_pull(&mut self, pull: &PullInfo) -> Result<Vec<Block>, NodeError> {
        let request = Message::BulkPull(BulkPull {
            start: *pull.head.as_bytes(),
            end: pull.end,
            count: pull.count,
        });
        self.stream.write_all(&request.serialize(self.network)).await?;

        let mut blocks = Vec::new();
        while let Some(block) = read_typed_block(&mut self.stream).await? {
            blocks.push(block);
            if blocks.len() >= MAX_BLOCKS_PER_PULL {
                return Err(NodeError::Bootstrap("oversized pull response".into()));
            }
        }
        Ok(blocks)
    }

    /// Fetch an account's frontier, balance and pending entries
    /// (`(send_hash, amount)` form).
    pub async fn bulk_pull_account(
        &mut self,
        account: Account,
        minimum_amount: Amount,
    ) -> Result<(BlockHash, Amount, Vec<(BlockHash, Amount)>), NodeError> {
        let request = Message::BulkPullAccount(BulkPullAccount {
            account,
            minimum_amount,
            flags: BulkPullAccountFlags::PendingHashAndAmount,
        });
        self.stream.write_all(&request.serialize(self.network)).await?;

        let mut head = [0u8; 48];
        self.read_exact(&mut head).await?;
        let mut frontier = [0u8; 32];
        let mut balance = [0u8; 16];
        frontier.copy_from_slice(&head[..32]);
        balance.copy_from_slice(&head[32..]);

        let mut pending = Vec::new();
        let mut entry = [0u8; 48];
        loop {
            self.read_exact(&mut entry).await?;
            if entry.iter().all(|&byte| byte == 0) {
                break;
            }
            let mut hash = [0u8; 32];
            let mut amount = [0u8; 16];
            hash.copy_from_slice(&entry[..32]);
            amount.copy_from_slice(&entry[32..]);
            pending.push((BlockHash::new(hash), Amount::from_be_bytes(amount)));
        }
        Ok((
            BlockHash::new(frontier),
            Amount::from_be_bytes(balance),
            pending,
        ))
    }

    /// Push our side of diverged chains: announcement, blocks in forward
    /// order, `not_a_block` terminator.
    pub async fn bulk_push(&mut self, blocks: &[Block]) -> Result<(), NodeError> {
        self.stream
            .write_all(&Message::BulkPush.serialize(self.network))
            .await?;
        let mut buffer = Vec::new();
        for block in blocks {
            block.serialize_with_type(&mut buffer);
        }
        buffer.push(BlockType::NotABlock.as_u8());
        self.stream.write_all(&buffer).await?;
        Ok(())
    }
}
