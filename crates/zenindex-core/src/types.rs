//! Shared chain types for the indexing engine.

use std::fmt;

use crate::error::IndexerError;

// ─── Hashes ───────────────────────────────────────────────────────────────────

/// A 32-byte block hash in internal byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The all-zero hash, used as the parent of genesis.
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

/// A 32-byte transaction id in internal byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Txid(pub [u8; 32]);

impl Txid {
    /// The all-zero txid, used by coinbase inputs.
    pub const ZERO: Txid = Txid([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({self})")
    }
}

// ─── Blocks and transactions ──────────────────────────────────────────────────

/// A block as delivered by the upstream node, transient in memory while the
/// Block Applier runs its handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub height: u32,
    /// Block timestamp (seconds since epoch, as committed by the miner).
    pub time: u32,
    /// Opaque serialized header bytes.
    pub header: Vec<u8>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Returns `true` if this block is the direct child of `tip`.
    pub fn extends(&self, tip: &TipRecord) -> bool {
        self.prev_hash == tip.hash && self.height == tip.height + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub txid: Txid,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Raw serialized transaction bytes.
    pub raw: Vec<u8>,
}

impl Transaction {
    /// A coinbase transaction has a single input spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_txid == Txid::ZERO
            && self.inputs[0].prev_vout == u32::MAX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInput {
    pub prev_txid: Txid,
    pub prev_vout: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutput {
    /// Output value in satoshis.
    pub value: u64,
}

// ─── Tip record ───────────────────────────────────────────────────────────────

/// Encoded length of a tip record: 32-byte hash ∥ u32 big-endian height.
pub const TIP_RECORD_LEN: usize = 36;

/// A persisted tip cursor: the hash and height of the most recently committed
/// block on the locally indexed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipRecord {
    pub hash: BlockHash,
    pub height: u32,
}

impl TipRecord {
    pub fn new(hash: BlockHash, height: u32) -> Self {
        Self { hash, height }
    }

    pub fn encode(&self) -> [u8; TIP_RECORD_LEN] {
        let mut buf = [0u8; TIP_RECORD_LEN];
        buf[..32].copy_from_slice(&self.hash.0);
        buf[32..].copy_from_slice(&self.height.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexerError> {
        if bytes.len() != TIP_RECORD_LEN {
            return Err(IndexerError::StoreIo(format!(
                "malformed tip record: expected {TIP_RECORD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let hash = BlockHash::from_slice(&bytes[..32]).expect("length checked");
        let height = u32::from_be_bytes(bytes[32..].try_into().expect("length checked"));
        Ok(Self { hash, height })
    }
}

impl fmt::Display for TipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.hash, self.height)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
