//! Chain and pool event payloads carried over broadcast channels.

use crate::primitives::{Block, Transaction};
use std::sync::Arc;

/// Size of channels carrying chain-head events.
pub const CHAIN_HEAD_CHAN_SIZE: usize = 10;

/// Size of channels carrying side-chain events.
pub const CHAIN_SIDE_CHAN_SIZE: usize = 10;

/// The canonical head advanced to a new block.
#[derive(Clone, Debug)]
pub struct ChainHeadEvent {
    /// The new head block.
    pub block: Arc<Block>,
}

/// A block was imported off the canonical chain (a potential uncle).
#[derive(Clone, Debug)]
pub struct ChainSideEvent {
    /// The side-chain block.
    pub block: Arc<Block>,
}

/// New transactions entered the pool.
#[derive(Clone, Debug)]
pub struct NewTxsEvent {
    /// The freshly admitted transactions.
    pub txs: Vec<Transaction>,
}

/// A block mined locally was written to the chain.
#[derive(Clone, Debug)]
pub struct NewMinedBlockEvent {
    /// The sealed block.
    pub block: Arc<Block>,
}
