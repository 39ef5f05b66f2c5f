//! Receipts and logs.
//!
//! Receipts are produced while a block is still being built, so their
//! block-location fields stay unset until the final block hash is
//! known. [`stamp_block_location`] fills them in on deep copies; the
//! originals are never mutated, which keeps the pending snapshot and
//! the filter system from racing over shared log objects.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_rlp::{Encodable, RlpEncodable};

/// A log emitted during transaction execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Log {
    /// Address of the emitting contract.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,
    /// Number of the block the log was included in.
    pub block_number: u64,
    /// Hash of the originating transaction.
    pub tx_hash: B256,
    /// Index of the originating transaction within its block.
    pub tx_index: u64,
    /// Hash of the including block; zero until the block is sealed.
    pub block_hash: B256,
}

/// The result of applying one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    /// 1 on success, 0 on revert.
    pub status: u64,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Gas used by this transaction alone.
    pub gas_used: u64,
    /// Hash of the corresponding transaction.
    pub tx_hash: B256,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
    /// Hash of the including block; zero until the block is sealed.
    pub block_hash: B256,
    /// Number of the including block; zero until the block is sealed.
    pub block_number: u64,
    /// Position of the transaction within its block.
    pub transaction_index: u64,
}

#[derive(RlpEncodable)]
struct ReceiptRlp {
    status: u64,
    cumulative_gas_used: u64,
    gas_used: u64,
    tx_hash: B256,
}

impl Receipt {
    /// Hash of the receipt's consensus fields, used for the receipts
    /// root.
    pub fn rlp_hash(&self) -> B256 {
        let view = ReceiptRlp {
            status: self.status,
            cumulative_gas_used: self.cumulative_gas_used,
            gas_used: self.gas_used,
            tx_hash: self.tx_hash,
        };
        let mut buf = Vec::new();
        view.encode(&mut buf);
        keccak256(&buf)
    }
}

/// Deep-copy a slice of receipts.
pub fn copy_receipts(receipts: &[Receipt]) -> Vec<Receipt> {
    receipts.to_vec()
}

/// Deep-copy receipts and stamp block-location fields: the block hash,
/// block number and per-receipt transaction index, plus the block hash
/// of every contained log. Returns the stamped receipts and the
/// flattened log list in apply order.
pub fn stamp_block_location(
    receipts: &[Receipt],
    block_hash: B256,
    block_number: u64,
) -> (Vec<Receipt>, Vec<Log>) {
    let mut stamped = Vec::with_capacity(receipts.len());
    let mut flat_logs = Vec::new();
    for (index, receipt) in receipts.iter().enumerate() {
        let mut receipt = receipt.clone();
        receipt.block_hash = block_hash;
        receipt.block_number = block_number;
        receipt.transaction_index = index as u64;
        for log in &mut receipt.logs {
            log.block_hash = block_hash;
            log.block_number = block_number;
        }
        flat_logs.extend(receipt.logs.iter().cloned());
        stamped.push(receipt);
    }
    (stamped, flat_logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt_with_log(gas: u64) -> Receipt {
        Receipt {
            status: 1,
            gas_used: gas,
            cumulative_gas_used: gas,
            tx_hash: B256::repeat_byte(0x33),
            logs: vec![Log { address: Address::repeat_byte(0x0c), ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn stamping_fills_block_location() {
        let receipts = vec![receipt_with_log(21_000), receipt_with_log(42_000)];
        let hash = B256::repeat_byte(0xbb);

        let (stamped, logs) = stamp_block_location(&receipts, hash, 101);

        assert_eq!(stamped.len(), 2);
        assert_eq!(logs.len(), 2);
        for (i, receipt) in stamped.iter().enumerate() {
            assert_eq!(receipt.block_hash, hash);
            assert_eq!(receipt.block_number, 101);
            assert_eq!(receipt.transaction_index, i as u64);
            assert!(receipt.logs.iter().all(|l| l.block_hash == hash));
        }
        // Originals stay untouched.
        assert_eq!(receipts[0].block_hash, B256::ZERO);
        assert_eq!(receipts[0].logs[0].block_hash, B256::ZERO);
    }

    #[test]
    fn stamping_is_idempotent() {
        let receipts = vec![receipt_with_log(21_000)];
        let hash = B256::repeat_byte(0xbb);

        let (once, _) = stamp_block_location(&receipts, hash, 101);
        let (twice, _) = stamp_block_location(&once, hash, 101);

        assert_eq!(once, twice);
        assert_eq!(once.len(), receipts.len());
        // Equal modulo block-location fields.
        let mut scrubbed = once[0].clone();
        scrubbed.block_hash = B256::ZERO;
        scrubbed.block_number = 0;
        scrubbed.transaction_index = 0;
        scrubbed.logs = receipts[0].logs.clone();
        assert_eq!(scrubbed, receipts[0]);
    }

    #[test]
    fn copy_preserves_order_and_length() {
        let receipts = vec![receipt_with_log(1), receipt_with_log(2), receipt_with_log(3)];
        let copied = copy_receipts(&receipts);
        assert_eq!(copied, receipts);
    }
}
