//! Zero-difficulty development engine.
//!
//! Seals instantly (or after a configurable delay, to exercise
//! interrupt paths) and performs no proof-of-work. The sealed header
//! gets a fixed nonce so a sealed block hashes differently from its
//! unsealed form while the seal hash stays put.

use super::{Engine, EngineError};
use crate::chain::Blockchain;
use crate::primitives::{Block, Header, Receipt, Transaction};
use crate::state::PendingState;
use alloy_primitives::{B256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Nonce stamped into sealed headers.
const DEV_SEAL_NONCE: u64 = 1;

/// An [`Engine`] that seals without work.
#[derive(Clone, Debug, Default)]
pub struct DevEngine {
    seal_delay: Duration,
}

impl DevEngine {
    /// An engine that seals immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay each seal, builder style. Useful for exercising seal
    /// interruption.
    pub fn with_seal_delay(mut self, delay: Duration) -> Self {
        self.seal_delay = delay;
        self
    }
}

impl Engine for DevEngine {
    fn prepare(&self, chain: &dyn Blockchain, header: &mut Header) -> Result<(), EngineError> {
        if chain.block_by_hash(header.parent_hash).is_none() {
            return Err(EngineError::UnknownAncestor(header.parent_hash));
        }
        header.difficulty = U256::from(1);
        Ok(())
    }

    fn seal(
        &self,
        _chain: Arc<dyn Blockchain>,
        block: Block,
        results: mpsc::Sender<Block>,
        stop: oneshot::Receiver<()>,
    ) -> Result<(), EngineError> {
        let delay = self.seal_delay;
        tokio::spawn(async move {
            let mut sealed = block;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    sealed.header.nonce = DEV_SEAL_NONCE;
                    let number = sealed.number();
                    if results.send(sealed).await.is_err() {
                        debug!(target: "engine::dev", number, "seal result dropped");
                    }
                }
                _ = stop => {
                    debug!(target: "engine::dev", number = sealed.number(), "seal aborted");
                }
            }
        });
        Ok(())
    }

    fn seal_hash(&self, header: &Header) -> B256 {
        header.seal_hash()
    }

    fn finalize_and_assemble(
        &self,
        _chain: &dyn Blockchain,
        mut header: Header,
        state: &mut dyn PendingState,
        txs: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, EngineError> {
        header.state_root = state.state_root();
        Ok(Block::new(header, txs, uncles, receipts))
    }
}
