//! Raw consensus-byte decoding into engine types.
//!
//! The engine's types are chain-agnostic; this module binds them to the
//! Zen/Bitcoin wire format. Block hashes and txids are kept in internal
//! byte order.

use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;

use zenindex_core::{Block, BlockHash, IndexerError, Transaction, TxInput, TxOutput, Txid};

/// Decode a raw block. The wire format carries no height, so the caller
/// supplies the height it fetched the block at.
pub fn decode_block(raw: &[u8], height: u32) -> Result<Block, IndexerError> {
    let block: bitcoin::Block = encode::deserialize(raw)
        .map_err(|e| IndexerError::Upstream(format!("malformed block bytes: {e}")))?;
    Ok(convert_block(&block, height))
}

/// Decode a raw transaction.
pub fn decode_transaction(raw: &[u8]) -> Result<Transaction, IndexerError> {
    let tx: bitcoin::Transaction = encode::deserialize(raw)
        .map_err(|e| IndexerError::Upstream(format!("malformed transaction bytes: {e}")))?;
    Ok(convert_transaction(&tx))
}

pub fn convert_block(block: &bitcoin::Block, height: u32) -> Block {
    Block {
        hash: BlockHash(block.block_hash().to_byte_array()),
        prev_hash: BlockHash(block.header.prev_blockhash.to_byte_array()),
        height,
        time: block.header.time,
        header: encode::serialize(&block.header),
        transactions: block.txdata.iter().map(convert_transaction).collect(),
    }
}

pub fn convert_transaction(tx: &bitcoin::Transaction) -> Transaction {
    Transaction {
        txid: Txid(tx.compute_txid().to_byte_array()),
        inputs: tx
            .input
            .iter()
            .map(|txin| TxInput {
                prev_txid: Txid(txin.previous_output.txid.to_byte_array()),
                prev_vout: txin.previous_output.vout,
            })
            .collect(),
        outputs: tx.output.iter().map(|txout| TxOutput { value: txout.value.to_sat() }).collect(),
        raw: encode::serialize(tx),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
