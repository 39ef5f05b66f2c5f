//! Execution-layer block primitives.
//!
//! This module defines the block, transaction and receipt types the
//! sealing worker operates on. Identity hashes are keccak256 over RLP
//! encodings.
//!
//! # Block structure
//!
//! ```text
//! Block
//! ├── header: Header
//! │   ├── parent_hash: B256
//! │   ├── number: u64
//! │   ├── gas_limit / gas_used: u64
//! │   ├── time: u64
//! │   ├── base_fee: Option<u128>
//! │   └── mix_digest / nonce (seal fields)
//! ├── transactions: Vec<Transaction>
//! └── uncles: Vec<Header>
//! ```

mod block;
mod receipt;
mod transaction;

pub use block::{Block, Header};
pub use receipt::{copy_receipts, stamp_block_location, Log, Receipt};
pub use transaction::{Signer, Transaction, TX_GAS};
