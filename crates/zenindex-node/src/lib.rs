//! zenindex-node — assembly of the chain-indexing engine into a runnable
//! node: configuration, store opening, lifecycle orchestration, and the
//! public data-path APIs higher-level services call.
//!
//! The upstream full node client and the process bootstrap (CLI parsing,
//! signal handling, RPC surface) live outside this crate; they talk to it
//! through [`zenindex_core::UpstreamClient`] and [`Node`].

pub mod codec;
pub mod config;
pub mod logging;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use zenindex_core::client::{BlockIndexEntry, BlockRef};
use zenindex_core::retry::retry;
use zenindex_core::schema;
use zenindex_core::store::StoreConfig;
use zenindex_core::{
    Block, BlockApplier, BlockHash, Event, EventBus, IndexerError, Service, ServiceRegistry,
    Store, Subscription, SyncConfig, SyncDriver, TipBookkeeper, TipRecord, Topic, Transaction,
    Txid, UpstreamClient,
};
use zenindex_storage::RocksStore;

pub use config::{Network, NodeConfig, UnknownNetwork};

/// A running zenindex node.
///
/// Construction goes through [`Node::builder`]; `start` opens the store,
/// runs the version guard, starts services in dependency order, bootstraps
/// or verifies the tip, and spawns the sync driver.
pub struct Node {
    config: NodeConfig,
    store: Arc<dyn Store>,
    registry: Arc<ServiceRegistry>,
    bus: Arc<EventBus>,
    client: Arc<dyn UpstreamClient>,
    tip: Arc<TipBookkeeper>,
    shutdown: watch::Sender<bool>,
    tip_signal: Arc<Notify>,
    driver: Mutex<Option<JoinHandle<Result<(), IndexerError>>>>,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn builder(config: NodeConfig, client: Arc<dyn UpstreamClient>) -> NodeBuilder {
        NodeBuilder {
            config,
            client,
            services: Vec::new(),
            store: None,
            sync: SyncConfig::default(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The serial tip of the locally indexed chain.
    pub fn tip(&self) -> Option<TipRecord> {
        self.tip.serial_tip()
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    /// Wake the sync driver; wired to the upstream node's new-tip events.
    pub fn notify_new_tip(&self) {
        self.tip_signal.notify_one();
    }

    /// Consume a raw-transaction stream from the upstream node's mempool.
    ///
    /// Publication on the `transaction` topic is gated by
    /// `publish_mempool_transactions`; with the flag off the stream is
    /// drained and discarded.
    pub fn attach_mempool_stream(&self, mut raw_txs: mpsc::Receiver<Vec<u8>>) {
        let bus = Arc::clone(&self.bus);
        let publish = self.config.publish_mempool_transactions;
        tokio::spawn(async move {
            while let Some(raw) = raw_txs.recv().await {
                if !publish {
                    continue;
                }
                match codec::decode_transaction(&raw) {
                    Ok(tx) => {
                        bus.publish(Topic::Transaction, Event::Transaction { txid: tx.txid, raw })
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "ignoring malformed mempool transaction")
                    }
                }
            }
        });
    }

    // ─── Data-path APIs ───────────────────────────────────────────────────────

    pub async fn get_block(&self, block: BlockRef) -> Result<Block, IndexerError> {
        self.client.get_block(block).await
    }

    /// Fetch and decode a transaction. `NotFound` surfaces to the caller.
    pub async fn get_transaction(
        &self,
        txid: Txid,
        include_mempool: bool,
    ) -> Result<Transaction, IndexerError> {
        let raw = self.client.get_raw_transaction(txid, include_mempool).await?;
        codec::decode_transaction(&raw)
    }

    /// Forward a raw transaction to the upstream node.
    pub async fn send_transaction(&self, raw: &[u8]) -> Result<Txid, IndexerError> {
        self.client.send_raw_transaction(raw).await
    }

    /// Hex-string variant of [`Node::send_transaction`].
    pub async fn send_transaction_hex(&self, raw_hex: &str) -> Result<Txid, IndexerError> {
        let raw = hex::decode(raw_hex)
            .map_err(|e| IndexerError::Broadcast(format!("invalid transaction hex: {e}")))?;
        self.send_transaction(&raw).await
    }

    /// Fee estimate in satoshis per kilobyte.
    pub async fn estimate_fee(&self, blocks: u32) -> Result<u64, IndexerError> {
        self.client.estimate_fee(blocks).await
    }

    /// Parent hash of a block, via the upstream block index.
    pub async fn get_prev_hash(&self, hash: BlockHash) -> Result<BlockHash, IndexerError> {
        match self.client.get_block_index(hash).await? {
            Some(BlockIndexEntry { prev_hash, .. }) => Ok(prev_hash),
            None => Err(IndexerError::NotFound),
        }
    }

    /// Resolve the satoshi value of each input of `tx`, in input order.
    ///
    /// Previous-transaction lookups run concurrently, bounded by
    /// `max_transaction_limit`. Coinbase transactions have no resolvable
    /// inputs and yield an empty list.
    pub async fn input_values(&self, tx: &Transaction) -> Result<Vec<u64>, IndexerError> {
        if tx.is_coinbase() {
            return Ok(Vec::new());
        }
        let limit = self.config.max_transaction_limit.max(1);
        futures::stream::iter(tx.inputs.iter().copied())
            .map(|input| {
                let client = Arc::clone(&self.client);
                async move {
                    let raw = client.get_raw_transaction(input.prev_txid, true).await?;
                    let prev = codec::decode_transaction(&raw)?;
                    prev.outputs
                        .get(input.prev_vout as usize)
                        .map(|out| out.value)
                        .ok_or(IndexerError::NotFound)
                }
            })
            .buffered(limit)
            .try_collect()
            .await
    }

    // ─── Shutdown ─────────────────────────────────────────────────────────────

    /// Await the sync driver; returns its fatal error if it died.
    ///
    /// Intended for the bootstrap's supervision loop. Returns immediately
    /// once the driver has already been joined.
    pub async fn wait(&self) -> Result<(), IndexerError> {
        let handle = self.driver.lock().unwrap().take();
        match handle {
            Some(handle) => join_driver(handle).await,
            None => Ok(()),
        }
    }

    /// Graceful stop: signal the driver, let the in-flight batch settle,
    /// stop services in reverse dependency order, close the store.
    pub async fn stop(&self) -> Result<(), IndexerError> {
        tracing::info!("stopping node");
        let _ = self.shutdown.send(true);
        self.tip_signal.notify_one();

        let mut first_err = None;
        let handle = self.driver.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(err) = join_driver(handle).await {
                first_err.get_or_insert(err);
            }
        }
        if let Err(err) = self.registry.stop_all().await {
            first_err.get_or_insert(err);
        }
        if let Err(err) = self.store.close() {
            first_err.get_or_insert(err);
        }

        let uptime = Utc::now().signed_duration_since(self.started_at);
        tracing::info!(uptime_secs = uptime.num_seconds(), "node stopped");
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn join_driver(handle: JoinHandle<Result<(), IndexerError>>) -> Result<(), IndexerError> {
    match handle.await {
        Ok(result) => result,
        Err(join_err) => Err(IndexerError::HandlerFailure {
            service: "sync-driver".into(),
            reason: format!("driver task aborted: {join_err}"),
        }),
    }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Fluent assembly of a [`Node`].
pub struct NodeBuilder {
    config: NodeConfig,
    client: Arc<dyn UpstreamClient>,
    services: Vec<Arc<dyn Service>>,
    store: Option<Arc<dyn Store>>,
    sync: SyncConfig,
}

impl NodeBuilder {
    /// Register an indexer service. Order is preserved among services with
    /// no dependency relation.
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// Override the store backend (embedding and tests); the default opens
    /// RocksDB at the configured data path.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override sync driver tuning (tests compress the retry spacing).
    pub fn sync_config(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub async fn start(self) -> Result<Node, IndexerError> {
        let Self { config, client, services, store, sync } = self;
        logging::init_tracing(&config.log);
        tracing::info!(network = %config.network, datadir = %config.datadir.display(), "starting node");

        let store: Arc<dyn Store> = match store {
            Some(store) => store,
            None => {
                let store_config = StoreConfig {
                    path: config.db_path(),
                    max_open_files: config.max_open_files,
                };
                Arc::new(RocksStore::open(&store_config)?)
            }
        };

        schema::check_version(&*store)?;

        let registry = Arc::new(ServiceRegistry::new(services)?);
        registry.start_all().await?;

        let tip = Arc::new(TipBookkeeper::new(Arc::clone(&store)));
        tip.load()?;
        let bus = Arc::new(EventBus::default());
        let applier = Arc::new(BlockApplier::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&tip),
            Arc::clone(&bus),
        ));

        match tip.serial_tip() {
            None => {
                // Fresh database: connect-apply the genesis block.
                let genesis = retry(&sync.retry, "fetch genesis block", || {
                    let client = Arc::clone(&client);
                    async move { client.get_block(BlockRef::Height(0)).await }
                })
                .await
                .map_err(|err| {
                    IndexerError::UpstreamLost(format!("cannot fetch genesis block: {err}"))
                })?;
                applier.apply(&genesis, true).await?;
                tracing::info!(hash = %genesis.hash, "genesis block connected");
            }
            Some(serial) => {
                verify_tip_upstream(&client, &sync, serial, "tip").await?;
                match tip.concurrent_tip() {
                    Some(concurrent) if concurrent != serial => {
                        verify_tip_upstream(&client, &sync, concurrent, "concurrentTip").await?;
                    }
                    _ => {}
                }
                tracing::info!(tip = %serial, "resuming from stored tip");
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = SyncDriver::new(
            Arc::clone(&client),
            applier,
            Arc::clone(&tip),
            sync,
            shutdown_rx,
        );
        let tip_signal = driver.tip_signal();
        let handle = tokio::spawn(driver.run());

        Ok(Node {
            config,
            store,
            registry,
            bus,
            client,
            tip,
            shutdown: shutdown_tx,
            tip_signal,
            driver: Mutex::new(Some(handle)),
            started_at: Utc::now(),
        })
    }
}

/// Confirm the upstream node still knows a stored tip block. Persistent
/// failure means the data directory belongs to a chain the upstream no
/// longer serves, which only a reindex can fix.
async fn verify_tip_upstream(
    client: &Arc<dyn UpstreamClient>,
    sync: &SyncConfig,
    record: TipRecord,
    which: &str,
) -> Result<(), IndexerError> {
    retry(&sync.retry, "verify stored tip upstream", || {
        let client = Arc::clone(client);
        async move {
            match client.get_block_index(record.hash).await? {
                Some(entry) => Ok(entry),
                None => Err(IndexerError::NotFound),
            }
        }
    })
    .await
    .map_err(|err| {
        IndexerError::UpstreamLost(format!(
            "upstream node does not know the stored {which} block {} (height {}): {err}; \
             the data directory is stale, reindex required",
            record.hash, record.height
        ))
    })?;
    Ok(())
}
