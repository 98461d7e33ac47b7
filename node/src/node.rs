//! Node wiring — constructs and connects the core subsystems.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use weave_consensus::ActiveElections;
use weave_ledger::{Ledger, LedgerConstants};
use weave_network::ChannelTable;
use weave_store::Store;
use weave_types::BlockHash;
use weave_utils::StatsCounter;

use crate::block_processor::{BlockProcessor, BLOCK_PROCESSOR_COUNTERS};
use crate::bootstrap::{BootstrapConfig, BootstrapInitiator, BootstrapServer};
use crate::config::NodeConfig;
use crate::confirmation_height::ConfirmationHeightProcessor;
use crate::NodeError;

/// Upper bound on concurrently tracked elections.
const MAX_ACTIVE_ELECTIONS: usize = 16 * 1024;

/// The assembled node core. External layers (RPC, wallet, vote processing)
/// hang off the public fields.
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<Store>,
    pub ledger: Arc<Ledger>,
    pub stats: Arc<StatsCounter>,
    pub active: Arc<ActiveElections>,
    pub block_processor: Arc<BlockProcessor>,
    pub confirmation_height: Arc<ConfirmationHeightProcessor>,
    pub bootstrap: Arc<BootstrapInitiator>,
    pub bootstrap_server: Arc<BootstrapServer>,
    pub channels: Arc<ChannelTable>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    confirmed_receiver: Mutex<Option<Receiver<BlockHash>>>,
    stopped: AtomicBool,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let store = Arc::new(Store::open(&config.data_dir)?);
        let constants = LedgerConstants::for_network(config.network);
        let ledger = Arc::new(Ledger::new(Arc::clone(&store), constants)?);

        let mut counter_names: Vec<&'static str> = BLOCK_PROCESSOR_COUNTERS.to_vec();
        counter_names.extend_from_slice(&[
            "blocks_cemented",
            "confirmation_invalid_block",
            "messages_received",
            "messages_dropped",
        ]);
        let stats = Arc::new(StatsCounter::new(&counter_names));

        let (confirmed_sender, confirmed_receiver) = channel();
        let active = Arc::new(ActiveElections::new(MAX_ACTIVE_ELECTIONS, confirmed_sender));

        let block_processor = Arc::new(BlockProcessor::new(
            Arc::clone(&ledger),
            Arc::clone(&active),
            config.block_processor_batch_max_time_ms,
            Arc::clone(&stats),
        ));
        let confirmation_height = Arc::new(ConfirmationHeightProcessor::new(
            Arc::clone(&ledger),
            config.conf_height_processor_batch_min_time_ms,
            Arc::clone(&stats),
        ));
        let bootstrap_config = BootstrapConfig {
            bootstrap_connections: config.bootstrap_connections,
            bootstrap_connections_max: config.bootstrap_connections_max,
            ..Default::default()
        };
        let bootstrap = Arc::new(BootstrapInitiator::new(
            Arc::clone(&ledger),
            Arc::clone(&block_processor),
            bootstrap_config,
            config.network,
        ));
        let bootstrap_server = Arc::new(BootstrapServer::new(
            Arc::clone(&ledger),
            config.network,
            config.tcp_incoming_connections_max,
        ));

        Ok(Arc::new(Self {
            config,
            store,
            ledger,
            stats,
            active,
            block_processor,
            confirmation_height,
            bootstrap,
            bootstrap_server,
            channels: Arc::new(ChannelTable::new()),
            threads: Mutex::new(Vec::new()),
            confirmed_receiver: Mutex::new(Some(confirmed_receiver)),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Spawn the long-running worker threads.
    pub fn start(self: &Arc<Self>) {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());

        let processor = Arc::clone(&self.block_processor);
        threads.push(
            std::thread::Builder::new()
                .name("blck_proc".into())
                .spawn(move || processor.run())
                .expect("spawn block processor thread"),
        );

        let receiver = self
            .confirmed_receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(receiver) = receiver {
            let confirmation = Arc::clone(&self.confirmation_height);
            threads.push(
                std::thread::Builder::new()
                    .name("conf_hght".into())
                    .spawn(move || confirmation.run(receiver))
                    .expect("spawn confirmation height thread"),
            );
        }
        // Unchecked garbage collection: hourly, skipped while a bootstrap
        // attempt is filling the table.
        let gc_node = Arc::clone(self);
        threads.push(
            std::thread::Builder::new()
                .name("unchk_gc".into())
                .spawn(move || {
                    let mut ticks: u64 = 0;
                    while !gc_node.stopped.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_secs(1));
                        ticks += 1;
                        if ticks % 3600 != 0 {
                            continue;
                        }
                        if gc_node.bootstrap.current_attempt().is_some() {
                            continue;
                        }
                        let cutoff = gc_node.config.unchecked_cutoff_secs();
                        if let Err(error) = crate::unchecked::cleanup(&gc_node.store, cutoff) {
                            tracing::warn!(%error, "unchecked garbage collection failed");
                        }
                    }
                })
                .expect("spawn unchecked gc thread"),
        );

        tracing::info!(
            network = self.config.network.as_str(),
            port = self.config.port(),
            "node started"
        );
    }

    /// Stop workers and wait for them to drain.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.bootstrap.stop();
        self.block_processor.stop();
        self.confirmation_height.stop();
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("node stopped");
    }
}
