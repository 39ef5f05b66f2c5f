//! The consensus-engine seam.
//!
//! Sealing rules are opaque to the worker; it drives the engine
//! through four operations:
//!
//! - [`Engine::prepare`] — stamp consensus fields onto a fresh header,
//! - [`Engine::seal`] — asynchronously seal an assembled block,
//!   delivering results over a channel and honoring a stop signal,
//! - [`Engine::seal_hash`] — the stable identity of a sealing attempt,
//! - [`Engine::finalize_and_assemble`] — post-transaction state
//!   adjustments and final block assembly.
//!
//! [`DevEngine`] is the in-crate implementation used by tests and
//! local networks: zero-difficulty instant sealing with an optional
//! artificial delay.

mod dev;

pub use dev::DevEngine;

use crate::chain::Blockchain;
use crate::primitives::{Block, Header, Receipt, Transaction};
use crate::state::PendingState;
use alloy_primitives::B256;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Errors surfaced by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The header's parent is not known to the chain.
    #[error("unknown ancestor {0}")]
    UnknownAncestor(B256),

    /// The header violates a consensus rule.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Sealing could not be started or failed.
    #[error("sealing failed: {0}")]
    Seal(String),
}

/// A consensus engine capable of preparing and sealing blocks.
pub trait Engine: Send + Sync {
    /// Initialize the consensus fields of a header under construction.
    fn prepare(&self, chain: &dyn Blockchain, header: &mut Header) -> Result<(), EngineError>;

    /// Seal the given block asynchronously. The sealed block arrives on
    /// `results`; dropping or firing `stop` aborts the attempt. The
    /// engine may deliver nothing at all if aborted.
    fn seal(
        &self,
        chain: Arc<dyn Blockchain>,
        block: Block,
        results: mpsc::Sender<Block>,
        stop: oneshot::Receiver<()>,
    ) -> Result<(), EngineError>;

    /// Digest over the header excluding the fields the sealer fills in.
    fn seal_hash(&self, header: &Header) -> B256;

    /// Apply post-transaction consensus adjustments to the state and
    /// assemble the final block.
    fn finalize_and_assemble(
        &self,
        chain: &dyn Blockchain,
        header: Header,
        state: &mut dyn PendingState,
        txs: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError>;
}
