//! Reserved key namespace, schema versioning, and service prefix allocation.
//!
//! Every key in the database begins with a two-byte prefix: `0x00 0x00` for
//! system records, or a prefix assigned here for a service. Assigned prefixes
//! are never reused, even after a service is removed.

use crate::error::IndexerError;
use crate::store::Store;

/// The reserved system namespace.
pub const SYSTEM_PREFIX: [u8; 2] = [0x00, 0x00];

/// Compiled schema version. Bumped whenever an indexer key layout changes,
/// which requires a full reindex.
pub const SCHEMA_VERSION: u32 = 2;

fn system_key(suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(SYSTEM_PREFIX.len() + suffix.len());
    key.extend_from_slice(&SYSTEM_PREFIX);
    key.extend_from_slice(suffix);
    key
}

/// Key of the serial tip record.
pub fn tip_key() -> Vec<u8> {
    system_key(b"tip")
}

/// Key of the concurrent tip record.
pub fn concurrent_tip_key() -> Vec<u8> {
    system_key(b"concurrentTip")
}

/// Key of the u32 big-endian schema version.
pub fn version_key() -> Vec<u8> {
    system_key(b"version")
}

/// Key of the u16 big-endian next free service prefix.
pub fn next_unused_key() -> Vec<u8> {
    system_key(b"nextUnused")
}

/// Key under which a service's assigned prefix is persisted.
pub fn prefix_key(service_name: &str) -> Vec<u8> {
    let mut key = system_key(b"prefix-");
    key.extend_from_slice(service_name.as_bytes());
    key
}

// ─── Version guard ────────────────────────────────────────────────────────────

/// Compare the on-disk schema version to the compiled one.
///
/// A fresh database (no tip record) is stamped with [`SCHEMA_VERSION`]. An
/// existing database without a version record is treated as legacy version 1.
/// Any mismatch fails before a single non-version mutation is written.
pub fn check_version(store: &dyn Store) -> Result<(), IndexerError> {
    if store.get(&tip_key())?.is_none() {
        store.put(&version_key(), &SCHEMA_VERSION.to_be_bytes())?;
        tracing::info!(version = SCHEMA_VERSION, "fresh database, schema version stamped");
        return Ok(());
    }
    let on_disk = match store.get(&version_key())? {
        Some(bytes) => {
            let arr: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| IndexerError::StoreIo("malformed version record".into()))?;
            u32::from_be_bytes(arr)
        }
        None => 1,
    };
    if on_disk != SCHEMA_VERSION {
        return Err(IndexerError::VersionMismatch { on_disk, expected: SCHEMA_VERSION });
    }
    Ok(())
}

// ─── Service prefix allocation ────────────────────────────────────────────────

/// A two-byte service prefix, unique per service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServicePrefix(pub [u8; 2]);

impl ServicePrefix {
    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }

    /// Build a full key under this service's namespace.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(2 + suffix.len());
        key.extend_from_slice(&self.0);
        key.extend_from_slice(suffix);
        key
    }
}

/// Assign (or look up) the prefix for `service_name`.
///
/// Idempotent on retry: if `prefix-<name>` is already present its value wins.
/// The individual writes are not batched; a crash between them can leak a
/// value from `nextUnused`, which is acceptable because uniqueness, not
/// density, is the invariant.
pub fn assign_prefix(store: &dyn Store, service_name: &str) -> Result<ServicePrefix, IndexerError> {
    if let Some(bytes) = store.get(&prefix_key(service_name))? {
        let arr: [u8; 2] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IndexerError::StoreIo("malformed service prefix record".into()))?;
        return Ok(ServicePrefix(arr));
    }

    let next = match store.get(&next_unused_key())? {
        Some(bytes) => {
            let arr: [u8; 2] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| IndexerError::StoreIo("malformed nextUnused record".into()))?;
            u16::from_be_bytes(arr)
        }
        None => 0x0001,
    };
    // 0xFFFF cannot be assigned: its successor does not fit in 16 bits.
    let successor = next.checked_add(1).ok_or(IndexerError::PrefixExhausted)?;

    let prefix = next.to_be_bytes();
    store.put(&prefix_key(service_name), &prefix)?;
    store.put(&next_unused_key(), &successor.to_be_bytes())?;
    tracing::debug!(service = service_name, prefix = %hex::encode(prefix), "service prefix assigned");
    Ok(ServicePrefix(prefix))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
