//! RocksDB-backed persistent store.
//!
//! All mutations from the Block Applier arrive as atomic [`BatchOp`] sets
//! and are written as one RocksDB `WriteBatch` with a synchronous WAL
//! write, so a batch that returned Ok survives a process crash.

use rocksdb::{Options, WriteBatch, WriteOptions, DB};

use zenindex_core::store::{Store, StoreConfig, StoreIter};
use zenindex_core::{BatchOp, IndexerError};

/// RocksDB store at `<datadir>/.../bitcore-node.db`.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: &StoreConfig) -> Result<Self, IndexerError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexerError::StoreIo(format!("create {}: {e}", parent.display())))?;
        }
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        let db = DB::open(&opts, &config.path)
            .map_err(|e| IndexerError::StoreIo(format!("open {}: {e}", config.path.display())))?;
        tracing::info!(path = %config.path.display(), "database opened");
        Ok(Self { db })
    }
}

fn store_io(err: rocksdb::Error) -> IndexerError {
    IndexerError::StoreIo(err.to_string())
}

impl Store for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        self.db.get(key).map_err(store_io)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexerError> {
        self.db.put(key, value).map_err(store_io)
    }

    fn del(&self, key: &[u8]) -> Result<(), IndexerError> {
        self.db.delete(key).map_err(store_io)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> Result<(), IndexerError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put(key, value),
                BatchOp::Del { key } => batch.delete(key),
            }
        }
        // Synchronous WAL write: the batch is durable once this returns.
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(batch, &write_opts).map_err(store_io)
    }

    fn iterate(&self, prefix: &[u8]) -> Result<StoreIter<'_>, IndexerError> {
        let prefix = prefix.to_vec();
        // No prefix extractor is configured, so the iterator runs to the end
        // of the keyspace; the take_while bounds the scan to the prefix.
        let iter = self
            .db
            .prefix_iterator(prefix.clone())
            .map(|item| item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(store_io))
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            });
        Ok(Box::new(iter))
    }

    fn close(&self) -> Result<(), IndexerError> {
        self.db.flush().map_err(store_io)
    }
}
