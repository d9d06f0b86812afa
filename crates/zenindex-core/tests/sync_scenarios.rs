//! End-to-end sync scenarios against a programmable mock upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use zenindex_core::client::{BlockIndexEntry, BlockRef, UpstreamClient};
use zenindex_core::schema::{self, ServicePrefix};
use zenindex_core::service::BlockContext;
use zenindex_core::store::MemoryStore;
use zenindex_core::{
    BatchOp, Block, BlockApplier, BlockHash, EventBus, IndexerError, RetryPolicy, Service,
    ServiceRegistry, Store, SyncConfig, SyncDriver, TipBookkeeper, TipRecord, Txid,
};

// ─── Chain construction ───────────────────────────────────────────────────────

fn bhash(branch: u8, height: u32) -> BlockHash {
    let mut h = [0u8; 32];
    h[0] = branch;
    h[1..5].copy_from_slice(&height.to_be_bytes());
    // Marker so no chain hash collides with BlockHash::ZERO.
    h[31] = 0x5A;
    BlockHash(h)
}

fn mk_block(branch: u8, height: u32, parent: BlockHash) -> Block {
    Block {
        hash: bhash(branch, height),
        prev_hash: parent,
        height,
        time: 1_600_000_000 + height,
        header: vec![],
        transactions: vec![],
    }
}

/// Build a straight chain on `branch` from genesis up to `to_height`.
fn straight_chain(branch: u8, to_height: u32) -> Vec<Block> {
    let mut chain = Vec::with_capacity(to_height as usize + 1);
    let mut parent = BlockHash::ZERO;
    for height in 0..=to_height {
        let block = mk_block(branch, height, parent);
        parent = block.hash;
        chain.push(block);
    }
    chain
}

// ─── Mock upstream ────────────────────────────────────────────────────────────

/// Upstream node over a mutable main chain. Replaced (orphaned) blocks stay
/// reachable by hash, as the real node's block index keeps them.
struct MockUpstream {
    main: Mutex<Vec<BlockHash>>,
    by_hash: Mutex<HashMap<BlockHash, Block>>,
}

impl MockUpstream {
    fn with_chain(chain: Vec<Block>) -> Arc<Self> {
        let main = chain.iter().map(|b| b.hash).collect();
        let by_hash = chain.into_iter().map(|b| (b.hash, b)).collect();
        Arc::new(Self { main: Mutex::new(main), by_hash: Mutex::new(by_hash) })
    }

    /// Append blocks to the main chain.
    fn extend_main(&self, blocks: Vec<Block>) {
        let mut main = self.main.lock().unwrap();
        let mut by_hash = self.by_hash.lock().unwrap();
        for block in blocks {
            assert_eq!(block.height as usize, main.len(), "extend must stay contiguous");
            main.push(block.hash);
            by_hash.insert(block.hash, block);
        }
    }

    /// Replace everything from `from_height` upward with a new suffix. The
    /// replaced blocks remain fetchable by hash.
    fn replace_suffix(&self, from_height: u32, blocks: Vec<Block>) {
        self.main.lock().unwrap().truncate(from_height as usize);
        self.extend_main(blocks);
    }

    /// Advertise a main-chain entry whose block body is unavailable.
    fn extend_main_hash_only(&self, hash: BlockHash) {
        self.main.lock().unwrap().push(hash);
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn get_tip(&self) -> Result<(BlockHash, u32), IndexerError> {
        let main = self.main.lock().unwrap();
        let height = (main.len() - 1) as u32;
        Ok((main[height as usize], height))
    }

    async fn get_block(&self, r: BlockRef) -> Result<Block, IndexerError> {
        let hash = match r {
            BlockRef::Hash(h) => h,
            BlockRef::Height(h) => {
                *self.main.lock().unwrap().get(h as usize).ok_or(IndexerError::NotFound)?
            }
        };
        self.by_hash.lock().unwrap().get(&hash).cloned().ok_or(IndexerError::NotFound)
    }

    async fn get_block_index(
        &self,
        hash: BlockHash,
    ) -> Result<Option<BlockIndexEntry>, IndexerError> {
        Ok(self
            .by_hash
            .lock()
            .unwrap()
            .get(&hash)
            .map(|b| BlockIndexEntry { prev_hash: b.prev_hash, height: b.height }))
    }

    async fn get_mempool(&self) -> Result<Vec<Txid>, IndexerError> {
        Ok(vec![])
    }

    async fn get_raw_transaction(
        &self,
        _txid: Txid,
        _include_mempool: bool,
    ) -> Result<Vec<u8>, IndexerError> {
        Err(IndexerError::NotFound)
    }

    async fn send_raw_transaction(&self, _raw: &[u8]) -> Result<Txid, IndexerError> {
        Err(IndexerError::Broadcast("mock upstream".into()))
    }

    async fn estimate_fee(&self, _blocks: u32) -> Result<u64, IndexerError> {
        Ok(1000)
    }
}

// ─── Test indexer ─────────────────────────────────────────────────────────────

/// Indexes one key per block under its assigned prefix and records the
/// commit order it observed.
struct BlockKeyIndexer {
    store: Arc<dyn Store>,
    prefix: Mutex<Option<ServicePrefix>>,
    commits: Arc<Mutex<Vec<(u32, bool)>>>,
    serial: bool,
}

impl BlockKeyIndexer {
    fn new(name_is_serial: bool, store: Arc<dyn Store>) -> (Arc<Self>, Arc<Mutex<Vec<(u32, bool)>>>) {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let svc = Arc::new(Self {
            store,
            prefix: Mutex::new(None),
            commits: commits.clone(),
            serial: name_is_serial,
        });
        (svc, commits)
    }

    fn assigned(&self) -> ServicePrefix {
        self.prefix.lock().unwrap().expect("service started")
    }

    fn ops(&self, block: &Block, connect: bool) -> Vec<BatchOp> {
        self.commits.lock().unwrap().push((block.height, connect));
        let key = self.assigned().key(&block.height.to_be_bytes());
        if connect {
            vec![BatchOp::put(key, block.hash.0.to_vec())]
        } else {
            vec![BatchOp::del(key)]
        }
    }
}

#[async_trait]
impl Service for BlockKeyIndexer {
    fn name(&self) -> &str {
        if self.serial {
            "serial-keys"
        } else {
            "parallel-keys"
        }
    }

    async fn start(&self) -> Result<(), IndexerError> {
        let prefix = schema::assign_prefix(&*self.store, self.name())?;
        *self.prefix.lock().unwrap() = Some(prefix);
        Ok(())
    }

    async fn block_handler(
        &self,
        block: &Block,
        connect: bool,
        _ctx: &mut BlockContext,
    ) -> Result<Option<Vec<BatchOp>>, IndexerError> {
        if !self.serial {
            return Ok(None);
        }
        Ok(Some(self.ops(block, connect)))
    }

    async fn concurrent_block_handler(
        &self,
        block: &Block,
        connect: bool,
    ) -> Result<Option<Vec<BatchOp>>, IndexerError> {
        if self.serial {
            return Ok(None);
        }
        Ok(Some(self.ops(block, connect)))
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<MemoryStore>,
    tip: Arc<TipBookkeeper>,
    driver: SyncDriver,
    serial_commits: Arc<Mutex<Vec<(u32, bool)>>>,
    serial_prefix: ServicePrefix,
    _shutdown: watch::Sender<bool>,
}

async fn harness(client: Arc<MockUpstream>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    schema::check_version(&*store).unwrap();

    let store_dyn: Arc<dyn Store> = store.clone();
    let (serial, serial_commits) = BlockKeyIndexer::new(true, store_dyn.clone());
    let (parallel, _) = BlockKeyIndexer::new(false, store_dyn.clone());
    let serial_for_prefix = serial.clone();

    let registry = Arc::new(
        ServiceRegistry::new(vec![serial as Arc<dyn Service>, parallel as Arc<dyn Service>])
            .unwrap(),
    );
    registry.start_all().await.unwrap();
    let serial_prefix = serial_for_prefix.assigned();

    let tip = Arc::new(TipBookkeeper::new(store_dyn.clone()));
    tip.load().unwrap();
    let bus = Arc::new(EventBus::default());
    let applier = Arc::new(BlockApplier::new(store_dyn, registry, tip.clone(), bus));

    // Genesis bootstrap, as the node lifecycle does on a fresh database.
    let genesis = client.get_block(BlockRef::Height(0)).await.unwrap();
    applier.apply(&genesis, true).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = SyncConfig {
        poll_interval: Duration::from_millis(5),
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
    };
    let driver = SyncDriver::new(client, applier, tip.clone(), config, shutdown_rx);

    Harness { store, tip, driver, serial_commits, serial_prefix, _shutdown: shutdown_tx }
}

/// All service keys currently stored under `prefix`, as `(height, hash)`.
fn indexed_keys(store: &MemoryStore, prefix: ServicePrefix) -> Vec<(u32, Vec<u8>)> {
    store
        .iterate(prefix.as_bytes())
        .unwrap()
        .map(|res| {
            let (key, value) = res.unwrap();
            let height = u32::from_be_bytes(key[2..6].try_into().unwrap());
            (height, value)
        })
        .collect()
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn linear_growth_commits_in_order() {
    let chain = straight_chain(0, 100);
    let parent_of_new = chain.last().unwrap().hash;
    let client = MockUpstream::with_chain(chain);
    let mut h = harness(client.clone()).await;

    // Catch up to 100 first.
    h.driver.sync_to_tip().await.unwrap();
    assert_eq!(h.tip.serial_tip(), Some(TipRecord::new(bhash(0, 100), 100)));

    // Upstream advances five blocks.
    let mut parent = parent_of_new;
    let mut extension = Vec::new();
    for height in 101..=105 {
        let block = mk_block(0, height, parent);
        parent = block.hash;
        extension.push(block);
    }
    client.extend_main(extension);
    h.serial_commits.lock().unwrap().clear();

    h.driver.sync_to_tip().await.unwrap();

    assert_eq!(h.tip.serial_tip(), Some(TipRecord::new(bhash(0, 105), 105)));
    assert_eq!(h.tip.concurrent_tip(), Some(TipRecord::new(bhash(0, 105), 105)));
    let commits = h.serial_commits.lock().unwrap().clone();
    assert_eq!(
        commits,
        vec![(101, true), (102, true), (103, true), (104, true), (105, true)],
        "five connects, strictly in chain order"
    );
}

#[tokio::test]
async fn one_block_reorg() {
    // Local tip A at height 200; upstream switches to B at 200 and C at 201,
    // both building on the shared parent P at 199.
    let chain = straight_chain(0, 200);
    let p_hash = chain[199].hash;
    let a_hash = chain[200].hash;
    let client = MockUpstream::with_chain(chain);
    let mut h = harness(client.clone()).await;
    h.driver.sync_to_tip().await.unwrap();
    assert_eq!(h.tip.serial_tip(), Some(TipRecord::new(a_hash, 200)));

    let b = mk_block(1, 200, p_hash);
    let c = mk_block(1, 201, b.hash);
    client.replace_suffix(200, vec![b.clone(), c.clone()]);
    h.serial_commits.lock().unwrap().clear();

    h.driver.sync_to_tip().await.unwrap();

    assert_eq!(h.tip.serial_tip(), Some(TipRecord::new(c.hash, 201)));
    let commits = h.serial_commits.lock().unwrap().clone();
    assert_eq!(
        commits,
        vec![(200, false), (200, true), (201, true)],
        "one disconnect of A, then B and C connect"
    );

    // No keys from the orphaned branch remain: heights are contiguous and
    // height 200 now maps to B.
    let keys = indexed_keys(&h.store, h.serial_prefix);
    assert_eq!(keys.len(), 202);
    assert_eq!(keys[200], (200, b.hash.0.to_vec()));
    assert_eq!(keys[201], (201, c.hash.0.to_vec()));
}

#[tokio::test]
async fn deep_reorg_three_blocks() {
    // Local A₁←A₂←A₃ at 500–502; upstream branch B₁…B₄ from the 499 ancestor.
    let chain = straight_chain(0, 502);
    let ancestor = chain[499].hash;
    let client = MockUpstream::with_chain(chain);
    let mut h = harness(client.clone()).await;
    h.driver.sync_to_tip().await.unwrap();
    assert_eq!(h.tip.serial_tip().unwrap().height, 502);

    let mut parent = ancestor;
    let mut branch = Vec::new();
    for height in 500..=503 {
        let block = mk_block(2, height, parent);
        parent = block.hash;
        branch.push(block);
    }
    client.replace_suffix(500, branch);
    h.serial_commits.lock().unwrap().clear();

    h.driver.sync_to_tip().await.unwrap();

    assert_eq!(h.tip.serial_tip(), Some(TipRecord::new(bhash(2, 503), 503)));
    let commits = h.serial_commits.lock().unwrap().clone();
    assert_eq!(
        commits,
        vec![
            (502, false),
            (501, false),
            (500, false),
            (500, true),
            (501, true),
            (502, true),
            (503, true),
        ],
        "disconnect A₃, A₂, A₁ in that order, then apply B₁…B₄"
    );
}

#[tokio::test]
async fn reorg_state_equals_fresh_sync_of_winning_branch() {
    // Sync through a reorg, then compare every indexed key against a node
    // that only ever saw the winning branch.
    let chain = straight_chain(0, 20);
    let ancestor = chain[15].hash;
    let client = MockUpstream::with_chain(chain);
    let mut h = harness(client.clone()).await;
    h.driver.sync_to_tip().await.unwrap();

    let mut parent = ancestor;
    let mut branch = Vec::new();
    for height in 16..=22 {
        let block = mk_block(3, height, parent);
        parent = block.hash;
        branch.push(block);
    }
    client.replace_suffix(16, branch.clone());
    h.driver.sync_to_tip().await.unwrap();

    // Fresh node over the final chain only.
    let mut final_chain = straight_chain(0, 15);
    final_chain.extend(branch);
    let fresh_client = MockUpstream::with_chain(final_chain);
    let mut fresh = harness(fresh_client).await;
    fresh.driver.sync_to_tip().await.unwrap();

    assert_eq!(h.tip.serial_tip(), fresh.tip.serial_tip());
    assert_eq!(
        indexed_keys(&h.store, h.serial_prefix),
        indexed_keys(&fresh.store, fresh.serial_prefix),
        "reorged database equals from-scratch sync of the winning branch"
    );
}

#[tokio::test]
async fn missing_child_escalates_to_upstream_lost() {
    let chain = straight_chain(0, 5);
    let client = MockUpstream::with_chain(chain);
    let mut h = harness(client.clone()).await;
    h.driver.sync_to_tip().await.unwrap();

    // Upstream advertises a taller tip but cannot serve the child block.
    client.extend_main_hash_only(bhash(9, 6));

    let err = h.driver.sync_to_tip().await.unwrap_err();
    match err {
        IndexerError::UpstreamLost(msg) => assert!(msg.contains("height 6")),
        other => panic!("unexpected error: {other}"),
    }
    // Nothing was committed past the old tip.
    assert_eq!(h.tip.serial_tip(), Some(TipRecord::new(bhash(0, 5), 5)));
}

#[tokio::test]
async fn run_exits_cleanly_on_shutdown() {
    let client = MockUpstream::with_chain(straight_chain(0, 2));
    let h = harness(client).await;

    h._shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), h.driver.run())
        .await
        .expect("driver honors the stop signal")
        .unwrap();
}
