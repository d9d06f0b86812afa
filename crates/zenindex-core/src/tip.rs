//! Tip bookkeeping — the serial and concurrent tip cursors.
//!
//! Both cursors are written as part of every block batch, so they only
//! diverge across a crash that interrupts a multi-cursor commit. The
//! in-memory cache mirrors whatever the last successful commit persisted.

use std::sync::{Arc, Mutex};

use crate::batch::BatchOp;
use crate::error::IndexerError;
use crate::schema;
use crate::store::Store;
use crate::types::{Block, TipRecord};

/// Loads, caches, and advances the persisted tip cursors.
pub struct TipBookkeeper {
    store: Arc<dyn Store>,
    serial: Mutex<Option<TipRecord>>,
    concurrent: Mutex<Option<TipRecord>>,
}

impl TipBookkeeper {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, serial: Mutex::new(None), concurrent: Mutex::new(None) }
    }

    /// Read both cursors from the store into the cache.
    pub fn load(&self) -> Result<(), IndexerError> {
        *self.serial.lock().unwrap() = Self::read(&*self.store, &schema::tip_key())?;
        *self.concurrent.lock().unwrap() =
            Self::read(&*self.store, &schema::concurrent_tip_key())?;
        Ok(())
    }

    fn read(store: &dyn Store, key: &[u8]) -> Result<Option<TipRecord>, IndexerError> {
        match store.get(key)? {
            Some(bytes) => Ok(Some(TipRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The serial tip: advances only after serial handlers commit.
    pub fn serial_tip(&self) -> Option<TipRecord> {
        *self.serial.lock().unwrap()
    }

    /// The concurrent tip: advances after parallel handlers commit.
    pub fn concurrent_tip(&self) -> Option<TipRecord> {
        *self.concurrent.lock().unwrap()
    }

    /// The tip record a successful commit of `block` will name, and the two
    /// tip-update ops to append to that commit's batch.
    ///
    /// Connecting names the block itself; disconnecting names its parent.
    pub fn tip_ops(
        &self,
        block: &Block,
        connect: bool,
    ) -> Result<(TipRecord, [BatchOp; 2]), IndexerError> {
        let record = if connect {
            TipRecord::new(block.hash, block.height)
        } else {
            let height = block.height.checked_sub(1).ok_or_else(|| {
                IndexerError::ReorgFailed {
                    hash: block.hash,
                    height: block.height,
                    reason: "cannot disconnect the genesis block".into(),
                }
            })?;
            TipRecord::new(block.prev_hash, height)
        };
        let encoded = record.encode();
        let ops = [
            BatchOp::put(schema::tip_key(), encoded.to_vec()),
            BatchOp::put(schema::concurrent_tip_key(), encoded.to_vec()),
        ];
        Ok((record, ops))
    }

    /// Advance the cached cursors after the batch containing the matching
    /// tip ops has committed.
    pub fn record_committed(&self, record: TipRecord) {
        *self.serial.lock().unwrap() = Some(record);
        *self.concurrent.lock().unwrap() = Some(record);
    }
}
