//! The persistent store contract.
//!
//! An ordered, byte-keyed, byte-valued embedded KV engine with atomic
//! multi-op write batches and prefix iteration. The production RocksDB
//! backend lives in `zenindex-storage`; everything in this crate programs
//! against the trait.

use std::path::PathBuf;

use crate::batch::BatchOp;
use crate::error::IndexerError;

/// Iterator over `(key, value)` pairs of a prefix scan, in key order.
pub type StoreIter<'a> =
    Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), IndexerError>> + Send + 'a>;

/// Ordered byte→byte KV store with crash-safe atomic batches.
///
/// Writes are serialized by the commit task; readers use point reads and
/// tolerate concurrent writes. After `batch` returns Ok, its operations
/// survive a process crash.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexerError>;

    fn del(&self, key: &[u8]) -> Result<(), IndexerError>;

    /// Atomically apply every op: either all become durable or none do.
    fn batch(&self, ops: Vec<BatchOp>) -> Result<(), IndexerError>;

    /// Ordered scan over all keys beginning with `prefix`.
    fn iterate(&self, prefix: &[u8]) -> Result<StoreIter<'_>, IndexerError>;

    fn close(&self) -> Result<(), IndexerError>;
}

pub const DEFAULT_MAX_OPEN_FILES: i32 = 200;

/// Open-time configuration for a store backend.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory.
    pub path: PathBuf,
    /// Maximum number of open files the engine may hold.
    pub max_open_files: i32,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_open_files: DEFAULT_MAX_OPEN_FILES }
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Ordered in-memory store for tests and ephemeral nodes.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<(), IndexerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IndexerError::StoreIo("store is closed".into()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        self.check_open()?;
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexerError> {
        self.check_open()?;
        self.data.lock().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<(), IndexerError> {
        self.check_open()?;
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    fn batch(&self, ops: Vec<BatchOp>) -> Result<(), IndexerError> {
        self.check_open()?;
        // All ops land under one lock acquisition, so readers observe either
        // the pre-batch or post-batch state.
        let mut data = self.data.lock().unwrap();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Del { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iterate(&self, prefix: &[u8]) -> Result<StoreIter<'_>, IndexerError> {
        self.check_open()?;
        let data = self.data.lock().unwrap();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = data
            .range::<Vec<u8>, _>((Bound::Included(prefix.to_vec()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(pairs.into_iter().map(Ok)))
    }

    fn close(&self) -> Result<(), IndexerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = StoreConfig::new("/tmp/db");
        assert_eq!(cfg.max_open_files, 200);
        assert_eq!(cfg.path, PathBuf::from("/tmp/db"));
    }

    #[test]
    fn put_get_del() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.del(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn batch_applies_all_ops() {
        let store = MemoryStore::new();
        store.put(b"stale", b"x").unwrap();
        store
            .batch(vec![
                BatchOp::put(b"k1".to_vec(), b"v1".to_vec()),
                BatchOp::put(b"k2".to_vec(), b"v2".to_vec()),
                BatchOp::del(b"stale".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.get(b"stale").unwrap(), None);
    }

    #[test]
    fn prefix_iteration_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        store.put(&[1, 0, 3], b"c").unwrap();
        store.put(&[1, 0, 1], b"a").unwrap();
        store.put(&[1, 0, 2], b"b").unwrap();
        store.put(&[1, 1, 0], b"other-prefix").unwrap();
        store.put(&[0, 9], b"below").unwrap();

        let scanned: Vec<_> = store
            .iterate(&[1, 0])
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            scanned,
            vec![
                (vec![1, 0, 1], b"a".to_vec()),
                (vec![1, 0, 2], b"b".to_vec()),
                (vec![1, 0, 3], b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn closed_store_rejects_ops() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(store.get(b"a").is_err());
        assert!(store.put(b"a", b"1").is_err());
        assert!(store.batch(vec![]).is_err());
    }
}
