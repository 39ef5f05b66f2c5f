//! The blockchain access trait consumed by the sealing worker.

use super::{ChainConfig, ChainHeadEvent, ChainSideEvent};
use crate::primitives::{Block, Header, Log, Receipt};
use crate::state::PendingState;
use alloy_primitives::{B256, U256};
use tokio::sync::broadcast;

/// Errors surfaced by chain access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// No state available for the requested root.
    #[error("state unavailable for root {0}")]
    StateUnavailable(B256),

    /// The referenced block is unknown.
    #[error("unknown block {0}")]
    UnknownBlock(B256),

    /// Writing a block to the chain failed.
    #[error("block write failed: {0}")]
    Write(String),
}

/// Read/write access to the canonical chain.
///
/// Fork choice, persistence and gossip live behind this trait; the
/// worker only inserts blocks and reads ancestry and state.
pub trait Blockchain: Send + Sync {
    /// The chain's static configuration.
    fn config(&self) -> &ChainConfig;

    /// The current canonical head.
    fn current_block(&self) -> Block;

    /// Look up a block by hash.
    fn block_by_hash(&self, hash: B256) -> Option<Block>;

    /// Look up a canonical header by number.
    fn header_by_number(&self, number: u64) -> Option<Header>;

    /// Walk up to `max` blocks backwards from `hash` (inclusive).
    fn blocks_from_hash(&self, hash: B256, max: u64) -> Vec<Block>;

    /// Whether the block is already known to the chain.
    fn has_block(&self, hash: B256, number: u64) -> bool;

    /// Cumulative difficulty of the given block.
    fn total_difficulty(&self, hash: B256, number: u64) -> Option<U256>;

    /// State at the given root, if still available.
    fn state_at(&self, root: B256) -> Result<Box<dyn PendingState>, ChainError>;

    /// State at the given block, regenerating from at most `max_reorg`
    /// ancestors when the root itself was pruned.
    fn state_at_block(
        &self,
        block: &Block,
        max_reorg: u64,
    ) -> Result<Box<dyn PendingState>, ChainError>;

    /// Insert a sealed block with its receipts and final state and make
    /// it the canonical head. Emits a chain-head event when `emit` is
    /// set.
    fn write_block_and_set_head(
        &self,
        block: &Block,
        receipts: &[Receipt],
        logs: &[Log],
        state: Box<dyn PendingState>,
        emit: bool,
    ) -> Result<(), ChainError>;

    /// Subscribe to canonical head changes.
    fn subscribe_chain_head(&self) -> broadcast::Receiver<ChainHeadEvent>;

    /// Subscribe to side-chain block imports.
    fn subscribe_chain_side(&self) -> broadcast::Receiver<ChainSideEvent>;
}
