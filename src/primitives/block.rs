//! Block and header types.
//!
//! Headers carry two seal fields (`mix_digest`, `nonce`) that the
//! consensus engine fills in during sealing. [`Header::seal_hash`]
//! excludes them, giving every sealing attempt a stable identity that
//! survives the seal itself.

use super::{Receipt, Transaction};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};

/// An execution-layer block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Header {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Hash over the uncle headers included in the block.
    pub uncle_hash: B256,
    /// Beneficiary of block rewards and transaction fees.
    pub coinbase: Address,
    /// State root after applying this block.
    pub state_root: B256,
    /// Root over the block's transactions.
    pub transactions_root: B256,
    /// Root over the block's receipts.
    pub receipts_root: B256,
    /// Block difficulty (PoW), set by the consensus engine.
    pub difficulty: U256,
    /// Block height.
    pub number: u64,
    /// Maximum gas spendable in this block.
    pub gas_limit: u64,
    /// Gas consumed by the block's transactions so far.
    pub gas_used: u64,
    /// Block timestamp in unix seconds.
    pub time: u64,
    /// Arbitrary extra data (vanity), bounded by consensus rules.
    pub extra: Bytes,
    /// Mix digest; carries beacon randomness when available. Seal field.
    pub mix_digest: B256,
    /// Seal nonce filled in by the engine. Seal field.
    pub nonce: u64,
    /// EIP-1559 base fee, present from the activation block on.
    pub base_fee: Option<u128>,
}

/// RLP view of a full header. `base_fee` is flattened to zero when
/// absent so the encoding stays a fixed-arity list.
#[derive(RlpEncodable)]
struct HeaderRlp {
    parent_hash: B256,
    uncle_hash: B256,
    coinbase: Address,
    state_root: B256,
    transactions_root: B256,
    receipts_root: B256,
    difficulty: U256,
    number: u64,
    gas_limit: u64,
    gas_used: u64,
    time: u64,
    extra: Bytes,
    base_fee: u128,
    mix_digest: B256,
    nonce: u64,
}

/// RLP view of a header with the seal fields stripped.
#[derive(RlpEncodable)]
struct SealHeaderRlp {
    parent_hash: B256,
    uncle_hash: B256,
    coinbase: Address,
    state_root: B256,
    transactions_root: B256,
    receipts_root: B256,
    difficulty: U256,
    number: u64,
    gas_limit: u64,
    gas_used: u64,
    time: u64,
    extra: Bytes,
    base_fee: u128,
}

impl Header {
    /// Compute the header hash (block identity).
    pub fn hash(&self) -> B256 {
        let view = HeaderRlp {
            parent_hash: self.parent_hash,
            uncle_hash: self.uncle_hash,
            coinbase: self.coinbase,
            state_root: self.state_root,
            transactions_root: self.transactions_root,
            receipts_root: self.receipts_root,
            difficulty: self.difficulty,
            number: self.number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            time: self.time,
            extra: self.extra.clone(),
            base_fee: self.base_fee.unwrap_or_default(),
            mix_digest: self.mix_digest,
            nonce: self.nonce,
        };
        let mut buf = Vec::new();
        view.encode(&mut buf);
        keccak256(&buf)
    }

    /// Compute the digest over the header excluding the seal fields.
    ///
    /// This is the stable identity of a sealing attempt: it does not
    /// change when the engine fills in `mix_digest` and `nonce`.
    pub fn seal_hash(&self) -> B256 {
        let view = SealHeaderRlp {
            parent_hash: self.parent_hash,
            uncle_hash: self.uncle_hash,
            coinbase: self.coinbase,
            state_root: self.state_root,
            transactions_root: self.transactions_root,
            receipts_root: self.receipts_root,
            difficulty: self.difficulty,
            number: self.number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            time: self.time,
            extra: self.extra.clone(),
            base_fee: self.base_fee.unwrap_or_default(),
        };
        let mut buf = Vec::new();
        view.encode(&mut buf);
        keccak256(&buf)
    }
}

/// A complete block: header, transactions and uncle headers.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// Transactions in apply order.
    pub transactions: Vec<Transaction>,
    /// Included uncle headers.
    pub uncles: Vec<Header>,
}

impl Block {
    /// Assemble a block, deriving the transaction, receipt and uncle
    /// roots into the header.
    pub fn new(
        mut header: Header,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Self {
        header.transactions_root = ordered_root(transactions.iter().map(|tx| tx.hash()));
        header.receipts_root = ordered_root(receipts.iter().map(|r| r.rlp_hash()));
        header.uncle_hash = ordered_root(uncles.iter().map(|u| u.hash()));
        Self { header, transactions, uncles }
    }

    /// The block hash.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    /// The block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// The parent block hash.
    pub fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }

    /// The block timestamp in unix seconds.
    pub fn time(&self) -> u64 {
        self.header.time
    }

    /// The block gas limit.
    pub fn gas_limit(&self) -> u64 {
        self.header.gas_limit
    }

    /// Gas consumed by the block.
    pub fn gas_used(&self) -> u64 {
        self.header.gas_used
    }

    /// The EIP-1559 base fee, if the block is post-activation.
    pub fn base_fee(&self) -> Option<u128> {
        self.header.base_fee
    }
}

/// Root over an ordered list of item hashes.
fn ordered_root(hashes: impl Iterator<Item = B256>) -> B256 {
    let items: Vec<B256> = hashes.collect();
    let mut buf = Vec::new();
    items.encode(&mut buf);
    keccak256(&buf)
}
