//! Bootstrap — catching up to the network.
//!
//! The client side is a state machine over three modes: `legacy` (frontier
//! scan, then pulls, then push), `lazy` (hash walking from a seed) and
//! `wallet_lazy` (seeded with accounts whose pending entries start the lazy
//! walk). The server side answers the four bootstrap requests; see
//! [`server`].

pub mod client;
pub mod frontier_scan;
pub mod lazy;
pub mod pulls;
pub mod server;
pub mod wallet;

pub use client::BootstrapClient;
pub use frontier_scan::{compare_frontiers, FrontierComparison};
pub use lazy::{LazyBootstrap, LAZY_MAX_PULL_BLOCKS, LAZY_MAX_STOPPED};
pub use pulls::{PullInfo, PullQueue, LAZY_RETRY_LIMIT, PULL_RETRY_LIMIT};
pub use server::{BootstrapServer, IDLE_TIMEOUT};
pub use wallet::WalletLazy;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use weave_blocks::{Block, BlockType};
use weave_ledger::Ledger;
use weave_types::{Account, Amount, BlockHash, NetworkId};

use crate::block_processor::{BlockProcessor, BlockSource};
use crate::NodeError;

/// Pulls remaining at which the connection pool reaches its maximum.
const CONNECTION_SCALE_TARGET: f64 = 50_000.0;

/// A pull slower than this (after 30 s) is force-stopped and requeued.
const SLOW_PULL_SECS: f64 = 30.0;
const SLOW_PULL_BLOCKS_PER_SEC: f64 = 10.0;

/// Maximum full passes of one attempt.
const MAX_PASSES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapMode {
    Legacy,
    Lazy,
    WalletLazy,
}

#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    pub bootstrap_connections: usize,
    pub bootstrap_connections_max: usize,
    pub legacy_timeout: Duration,
    pub lazy_timeout: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            bootstrap_connections: 4,
            bootstrap_connections_max: 64,
            legacy_timeout: Duration::from_secs(30 * 60),
            lazy_timeout: Duration::from_secs(48 * 60 * 60),
        }
    }
}

/// Scale the connection pool linearly from the base toward the maximum as
/// the remaining pull count approaches 50 000.
pub fn target_connections(config: &BootstrapConfig, pulls_remaining: usize) -> usize {
    if config.bootstrap_connections >= config.bootstrap_connections_max {
        return config.bootstrap_connections_max.max(1);
    }
    let step = (pulls_remaining as f64 / CONNECTION_SCALE_TARGET).min(1.0);
    let range = (config.bootstrap_connections_max - config.bootstrap_connections) as f64;
    let target = config.bootstrap_connections as f64 + range * step;
    (target as usize).max(1)
}

/// Read one type-prefixed block from a bulk stream; `None` marks the
/// `not_a_block` terminator.
pub async fn read_typed_block<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Block>, NodeError> {
    let mut type_byte = [0u8; 1];
    reader.read_exact(&mut type_byte).await?;
    let block_type = BlockType::from_u8(type_byte[0])
        .ok_or_else(|| NodeError::Bootstrap(format!("unknown block type {}", type_byte[0])))?;
    let Some(body_size) = block_type.body_size() else {
        return Ok(None);
    };
    let mut body = vec![0u8; body_size];
    reader.read_exact(&mut body).await?;
    let block = Block::deserialize(block_type, &body)
        .map_err(|e| NodeError::Bootstrap(e.to_string()))?;
    Ok(Some(block))
}

/// One bootstrap cycle: mode, work queues, counters and the stop flag
/// checked at every suspension point.
pub struct BootstrapAttempt {
    mode: Mutex<BootstrapMode>,
    pub pulls: Mutex<PullQueue>,
    pub lazy: Mutex<LazyBootstrap>,
    pub wallet: Mutex<WalletLazy>,
    push_accounts: Mutex<Vec<Account>>,
    stopped: AtomicBool,
    started: Instant,
    pub total_blocks: AtomicU64,
}

impl BootstrapAttempt {
    pub fn new(mode: BootstrapMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            pulls: Mutex::new(PullQueue::new()),
            lazy: Mutex::new(LazyBootstrap::new()),
            wallet: Mutex::new(WalletLazy::new()),
            push_accounts: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            started: Instant::now(),
            total_blocks: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> BootstrapMode {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_mode(&self, mode: BootstrapMode) {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whole-attempt timeout: 30 minutes for legacy work, 48 hours when
    /// only lazy work remains.
    pub fn timed_out(&self, config: &BootstrapConfig) -> bool {
        let limit = match self.mode() {
            BootstrapMode::Legacy => config.legacy_timeout,
            BootstrapMode::Lazy | BootstrapMode::WalletLazy => config.lazy_timeout,
        };
        self.elapsed() >= limit
    }

    /// Inject a lazy seed; legacy attempts switch to lazy once their pull
    /// queue drains.
    pub fn lazy_start(&self, hash: BlockHash) {
        let mut lazy = self.lazy.lock().unwrap_or_else(|e| e.into_inner());
        lazy.seed(hash);
    }

    pub fn wallet_start(&self, accounts: impl IntoIterator<Item = Account>) {
        let mut wallet = self.wallet.lock().unwrap_or_else(|e| e.into_inner());
        wallet.seed_many(accounts);
    }

    pub fn pulls_remaining(&self) -> usize {
        self.pulls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn set_push_accounts(&self, accounts: Vec<Account>) {
        *self.push_accounts.lock().unwrap_or_else(|e| e.into_inner()) = accounts;
    }

    pub fn take_push_accounts(&self) -> Vec<Account> {
        std::mem::take(&mut self.push_accounts.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Observer signature for attempt lifecycle: `true` on start, `false` on
/// completion.
pub type AttemptObserver = Box<dyn Fn(bool) + Send + Sync>;

/// Drives bootstrap attempts: owns the current attempt and the connection
/// pool tasks.
pub struct BootstrapInitiator {
    ledger: Arc<Ledger>,
    processor: Arc<BlockProcessor>,
    config: BootstrapConfig,
    network: NetworkId,
    current: Mutex<Option<Arc<BootstrapAttempt>>>,
    observers: Mutex<Vec<AttemptObserver>>,
}

impl BootstrapInitiator {
    pub fn new(
        ledger: Arc<Ledger>,
        processor: Arc<BlockProcessor>,
        config: BootstrapConfig,
        network: NetworkId,
    ) -> Self {
        Self {
            ledger,
            processor,
            config,
            network,
            current: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: AttemptObserver) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.push(observer);
    }

    fn notify(&self, started: bool) {
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            observer(started);
        }
    }

    pub fn current_attempt(&self) -> Option<Arc<BootstrapAttempt>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stop(&self) {
        if let Some(attempt) = self.current_attempt() {
            attempt.stop();
        }
    }

    /// Start a new attempt, replacing (and stopping) any current one.
    pub fn begin_attempt(&self, mode: BootstrapMode) -> Arc<BootstrapAttempt> {
        let attempt = Arc::new(BootstrapAttempt::new(mode));
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = current.take() {
                previous.stop();
            }
            *current = Some(Arc::clone(&attempt));
        }
        self.notify(true);
        attempt
    }

    /// Run one attempt to completion against `peers`. At most three full
    /// passes; legacy flows into lazy when seeds were injected, wallet-lazy
    /// flows into lazy after its account scan.
    pub async fn run_attempt(
        self: &Arc<Self>,
        attempt: Arc<BootstrapAttempt>,
        peers: Vec<SocketAddr>,
    ) -> Result<(), NodeError> {
        if peers.is_empty() {
            return Err(NodeError::Bootstrap("no peers to bootstrap from".into()));
        }
        let result = self.run_passes(&attempt, &peers).await;
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            *current = None;
        }
        self.notify(false);
        result
    }

    async fn run_passes(
        self: &Arc<Self>,
        attempt: &Arc<BootstrapAttempt>,
        peers: &[SocketAddr],
    ) -> Result<(), NodeError> {
        for pass in 0..MAX_PASSES {
            if attempt.stopped() || attempt.timed_out(&self.config) {
                break;
            }
            tracing::debug!(pass, mode = ?attempt.mode(), "bootstrap pass");
            match attempt.mode() {
                BootstrapMode::Legacy => {
                    self.run_legacy(attempt, peers).await?;
                    let lazy_seeded = {
                        let lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
                        !lazy.is_done()
                    };
                    let wallet_seeded = {
                        let wallet = attempt.wallet.lock().unwrap_or_else(|e| e.into_inner());
                        !wallet.is_done()
                    };
                    if wallet_seeded {
                        attempt.set_mode(BootstrapMode::WalletLazy);
                    } else if lazy_seeded {
                        attempt.set_mode(BootstrapMode::Lazy);
                    } else {
                        break;
                    }
                }
                BootstrapMode::WalletLazy => {
                    self.run_wallet(attempt, peers[0]).await?;
                    attempt.set_mode(BootstrapMode::Lazy);
                }
                BootstrapMode::Lazy => {
                    self.run_lazy(attempt, peers[0]).await?;
                    let done = {
                        let lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
                        lazy.is_done()
                    };
                    if done {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Legacy pass: frontier scan against one peer, pulls across the
    /// connection pool, then bulk push of chains we are ahead on.
    async fn run_legacy(
        self: &Arc<Self>,
        attempt: &Arc<BootstrapAttempt>,
        peers: &[SocketAddr],
    ) -> Result<(), NodeError> {
        let stream = TcpStream::connect(peers[0]).await?;
        let mut client = BootstrapClient::new(stream, self.network);

        let remote = client
            .request_frontiers(Account::ZERO, u32::MAX, u32::MAX)
            .await?;
        let local = self.local_frontiers()?;
        let store = Arc::clone(self.ledger.store());
        let comparison = compare_frontiers(&local, &remote, |hash| {
            store
                .tx_begin_read()
                .and_then(|txn| store.block.exists(txn.raw(), hash))
                .unwrap_or(false)
        });
        tracing::info!(
            pulls = comparison.pulls.len(),
            pushes = comparison.push_accounts.len(),
            "frontier scan complete"
        );
        {
            let mut pulls = attempt.pulls.lock().unwrap_or_else(|e| e.into_inner());
            for pull in comparison.pulls {
                pulls.push(pull);
            }
            pulls.shuffle();
        }
        attempt.set_push_accounts(comparison.push_accounts);

        self.run_pulls(attempt, peers).await?;
        self.run_push(attempt, &mut client).await?;
        Ok(())
    }

    /// Dispatch pulls over a pool sized to the remaining work; one worker
    /// task per connection.
    async fn run_pulls(
        self: &Arc<Self>,
        attempt: &Arc<BootstrapAttempt>,
        peers: &[SocketAddr],
    ) -> Result<(), NodeError> {
        let connections = target_connections(&self.config, attempt.pulls_remaining());
        let mut tasks: JoinSet<()> = JoinSet::new();
        for index in 0..connections {
            let initiator = Arc::clone(self);
            let attempt = Arc::clone(attempt);
            let peer = peers[index % peers.len()];
            tasks.spawn(async move {
                if let Err(error) = initiator.pull_worker(&attempt, peer).await {
                    tracing::debug!(%error, %peer, "pull worker finished with error");
                }
            });
        }
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    async fn pull_worker(
        self: Arc<Self>,
        attempt: &Arc<BootstrapAttempt>,
        peer: SocketAddr,
    ) -> Result<(), NodeError> {
        let stream = TcpStream::connect(peer).await?;
        let mut client = BootstrapClient::new(stream, self.network);
        loop {
            if attempt.stopped() || attempt.timed_out(&self.config) {
                return Ok(());
            }
            let Some(mut pull) = ({
                let mut pulls = attempt.pulls.lock().unwrap_or_else(|e| e.into_inner());
                pulls.pop()
            }) else {
                return Ok(());
            };

            let started = Instant::now();
            match client.bulk_pull(&pull).await {
                Ok(blocks) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    let rate = blocks.len() as f64 / elapsed.max(0.001);
                    pull.processed += blocks.len() as u64;
                    if elapsed > SLOW_PULL_SECS && rate < SLOW_PULL_BLOCKS_PER_SEC {
                        // Force-stop slow peers: requeue for another worker.
                        let mut pulls =
                            attempt.pulls.lock().unwrap_or_else(|e| e.into_inner());
                        pulls.requeue(pull);
                        return Ok(());
                    }
                    attempt
                        .total_blocks
                        .fetch_add(blocks.len() as u64, Ordering::Relaxed);
                    self.enqueue_blocks(attempt, blocks).await;
                }
                Err(error) => {
                    tracing::debug!(%error, head = %pull.head, "pull failed");
                    let mut pulls = attempt.pulls.lock().unwrap_or_else(|e| e.into_inner());
                    pulls.requeue(pull);
                    // The connection may be poisoned; hand back to caller
                    // to reconnect.
                    return Err(error);
                }
            }
        }
    }

    /// Feed pulled blocks to the processor, throttling while it is
    /// saturated.
    async fn enqueue_blocks(&self, attempt: &Arc<BootstrapAttempt>, blocks: Vec<Block>) {
        for block in blocks {
            while self.processor.half_full() {
                if attempt.stopped() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.processor.add(block, BlockSource::Bootstrap);
        }
    }

    /// Push our side of every chain we are ahead on, oldest block first.
    async fn run_push<S>(
        &self,
        attempt: &Arc<BootstrapAttempt>,
        client: &mut BootstrapClient<S>,
    ) -> Result<(), NodeError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let push_accounts = attempt.take_push_accounts();
        if push_accounts.is_empty() {
            return Ok(());
        }
        let store = self.ledger.store();
        for account in push_accounts {
            if attempt.stopped() {
                break;
            }
            let chain = {
                let txn = store.tx_begin_read()?;
                let mut chain = Vec::new();
                let mut current = store
                    .account
                    .get(txn.raw(), &account)?
                    .map(|info| info.head)
                    .unwrap_or(BlockHash::ZERO);
                while !current.is_zero() {
                    let Some(stored) = store.block.get(txn.raw(), &current)? else {
                        break;
                    };
                    let previous = stored.block.previous();
                    chain.push(stored.block);
                    current = previous;
                }
                chain.reverse();
                chain
            };
            client.bulk_push(&chain).await?;
        }
        Ok(())
    }

    /// Lazy pass against a single peer.
    async fn run_lazy(
        self: &Arc<Self>,
        attempt: &Arc<BootstrapAttempt>,
        peer: SocketAddr,
    ) -> Result<(), NodeError> {
        let stream = TcpStream::connect(peer).await?;
        let mut client = BootstrapClient::new(stream, self.network);
        let store = Arc::clone(self.ledger.store());

        loop {
            if attempt.stopped() || attempt.timed_out(&self.config) {
                return Ok(());
            }
            let Some(pull) = ({
                let mut lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
                lazy.next_pull()
            }) else {
                return Ok(());
            };

            let blocks = match client.bulk_pull(&pull).await {
                Ok(blocks) => blocks,
                Err(error) => {
                    tracing::debug!(%error, head = %pull.head, "lazy pull failed");
                    let within_limits = {
                        let mut lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
                        lazy.mark_stopped(pull.head)
                    };
                    if !within_limits {
                        return Err(NodeError::Bootstrap(
                            "too many stopped lazy pulls".into(),
                        ));
                    }
                    continue;
                }
            };
            if blocks.is_empty() {
                let within_limits = {
                    let mut lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
                    lazy.mark_stopped(pull.head)
                };
                if !within_limits {
                    return Err(NodeError::Bootstrap("too many stopped lazy pulls".into()));
                }
                continue;
            }

            {
                let mut lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
                let txn = store.tx_begin_read()?;
                for block in &blocks {
                    lazy.process_block(
                        block,
                        |hash| store.block.exists(txn.raw(), hash).unwrap_or(false),
                        |hash| store.block.balance(txn.raw(), hash).ok().flatten(),
                    );
                }
            }
            attempt
                .total_blocks
                .fetch_add(blocks.len() as u64, Ordering::Relaxed);
            self.enqueue_blocks(attempt, blocks).await;
        }
    }

    /// Wallet-lazy pass: fetch pending entries per seeded account and seed
    /// the lazy walk with every unknown send hash.
    async fn run_wallet(
        self: &Arc<Self>,
        attempt: &Arc<BootstrapAttempt>,
        peer: SocketAddr,
    ) -> Result<(), NodeError> {
        let stream = TcpStream::connect(peer).await?;
        let mut client = BootstrapClient::new(stream, self.network);
        let store = self.ledger.store();

        loop {
            if attempt.stopped() || attempt.timed_out(&self.config) {
                return Ok(());
            }
            let Some(account) = ({
                let mut wallet = attempt.wallet.lock().unwrap_or_else(|e| e.into_inner());
                wallet.next()
            }) else {
                return Ok(());
            };

            let (_, _, pending) = client
                .bulk_pull_account(account, Amount::ZERO)
                .await?;
            let txn = store.tx_begin_read()?;
            let mut lazy = attempt.lazy.lock().unwrap_or_else(|e| e.into_inner());
            for (hash, _) in pending {
                if !store.block.exists(txn.raw(), &hash).unwrap_or(false) {
                    lazy.seed(hash);
                }
            }
        }
    }

    /// Our sorted `(account, head)` frontier view.
    fn local_frontiers(&self) -> Result<Vec<(Account, BlockHash)>, NodeError> {
        let store = self.ledger.store();
        let txn = store.tx_begin_read()?;
        let mut frontiers = Vec::new();
        for entry in store.account.iter(txn.raw())? {
            let (account, info) = entry?;
            frontiers.push((account, info.head));
        }
        Ok(frontiers)
    }
}
