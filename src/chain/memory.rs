//! In-memory chain.
//!
//! Reference [`Blockchain`] implementation: canonical index plus
//! per-root state retention, with broadcast feeds for head and side
//! events. Backs the worker tests and local development.

use super::events::{CHAIN_HEAD_CHAN_SIZE, CHAIN_SIDE_CHAN_SIZE};
use super::{
    ChainConfig, ChainError, ChainHeadEvent, ChainSideEvent, Blockchain,
};
use crate::primitives::{Block, Header, Log, Receipt};
use crate::state::PendingState;
use alloy_primitives::{B256, U256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

struct ChainInner {
    blocks: HashMap<B256, Block>,
    canonical: BTreeMap<u64, B256>,
    head: B256,
    states: HashMap<B256, Box<dyn PendingState>>,
    difficulties: HashMap<B256, U256>,
    receipts: HashMap<B256, Vec<Receipt>>,
}

/// An in-memory [`Blockchain`].
pub struct InMemoryChain {
    config: ChainConfig,
    inner: RwLock<ChainInner>,
    head_feed: broadcast::Sender<ChainHeadEvent>,
    side_feed: broadcast::Sender<ChainSideEvent>,
}

impl InMemoryChain {
    /// Create a chain rooted at `base` with the state behind it.
    ///
    /// `base` does not have to be a genesis block; tests routinely root
    /// a chain at an arbitrary height.
    pub fn new(config: ChainConfig, base: Block, base_state: Box<dyn PendingState>) -> Self {
        let hash = base.hash();
        let mut blocks = HashMap::new();
        let mut canonical = BTreeMap::new();
        let mut states = HashMap::new();
        let mut difficulties = HashMap::new();
        canonical.insert(base.number(), hash);
        difficulties.insert(hash, base.header.difficulty);
        states.insert(base.header.state_root, base_state);
        blocks.insert(hash, base);

        let (head_feed, _) = broadcast::channel(CHAIN_HEAD_CHAN_SIZE);
        let (side_feed, _) = broadcast::channel(CHAIN_SIDE_CHAN_SIZE);
        Self {
            config,
            inner: RwLock::new(ChainInner {
                blocks,
                canonical,
                head: hash,
                states,
                difficulties,
                receipts: HashMap::new(),
            }),
            head_feed,
            side_feed,
        }
    }

    /// Import a block without touching the canonical chain and announce
    /// it on the side feed, as a competing miner would.
    pub fn import_side_block(&self, block: Block) {
        let hash = block.hash();
        {
            let mut inner = self.inner.write().expect("chain lock poisoned");
            inner.blocks.insert(hash, block.clone());
        }
        let _ = self.side_feed.send(ChainSideEvent { block: Arc::new(block) });
    }

    /// Number of blocks known to the chain (canonical and side).
    pub fn block_count(&self) -> usize {
        self.inner.read().expect("chain lock poisoned").blocks.len()
    }

    /// Canonical hash at a height, if any.
    pub fn canonical_hash(&self, number: u64) -> Option<B256> {
        self.inner.read().expect("chain lock poisoned").canonical.get(&number).copied()
    }

    /// Receipts stored with a written block.
    pub fn receipts_of(&self, hash: B256) -> Option<Vec<Receipt>> {
        self.inner.read().expect("chain lock poisoned").receipts.get(&hash).cloned()
    }
}

impl Blockchain for InMemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn current_block(&self) -> Block {
        let inner = self.inner.read().expect("chain lock poisoned");
        inner.blocks[&inner.head].clone()
    }

    fn block_by_hash(&self, hash: B256) -> Option<Block> {
        self.inner.read().expect("chain lock poisoned").blocks.get(&hash).cloned()
    }

    fn header_by_number(&self, number: u64) -> Option<Header> {
        let inner = self.inner.read().expect("chain lock poisoned");
        let hash = inner.canonical.get(&number)?;
        inner.blocks.get(hash).map(|b| b.header.clone())
    }

    fn blocks_from_hash(&self, hash: B256, max: u64) -> Vec<Block> {
        let inner = self.inner.read().expect("chain lock poisoned");
        let mut out = Vec::new();
        let mut cursor = hash;
        while (out.len() as u64) < max {
            let Some(block) = inner.blocks.get(&cursor) else { break };
            cursor = block.parent_hash();
            out.push(block.clone());
        }
        out
    }

    fn has_block(&self, hash: B256, _number: u64) -> bool {
        self.inner.read().expect("chain lock poisoned").blocks.contains_key(&hash)
    }

    fn total_difficulty(&self, hash: B256, _number: u64) -> Option<U256> {
        self.inner.read().expect("chain lock poisoned").difficulties.get(&hash).copied()
    }

    fn state_at(&self, root: B256) -> Result<Box<dyn PendingState>, ChainError> {
        let inner = self.inner.read().expect("chain lock poisoned");
        inner
            .states
            .get(&root)
            .map(|s| s.deep_copy())
            .ok_or(ChainError::StateUnavailable(root))
    }

    fn state_at_block(
        &self,
        block: &Block,
        _max_reorg: u64,
    ) -> Result<Box<dyn PendingState>, ChainError> {
        // Nothing is ever pruned in memory, so recovery degenerates to
        // a plain lookup.
        self.state_at(block.header.state_root)
    }

    fn write_block_and_set_head(
        &self,
        block: &Block,
        receipts: &[Receipt],
        _logs: &[Log],
        state: Box<dyn PendingState>,
        emit: bool,
    ) -> Result<(), ChainError> {
        let hash = block.hash();
        {
            let mut inner = self.inner.write().expect("chain lock poisoned");
            if !inner.blocks.contains_key(&block.parent_hash()) {
                return Err(ChainError::UnknownBlock(block.parent_hash()));
            }
            let parent_td = inner
                .difficulties
                .get(&block.parent_hash())
                .copied()
                .unwrap_or_default();
            inner.difficulties.insert(hash, parent_td + block.header.difficulty);
            inner.states.insert(state.state_root(), state);
            inner.receipts.insert(hash, receipts.to_vec());
            inner.blocks.insert(hash, block.clone());
            inner.canonical.insert(block.number(), hash);
            inner.canonical.split_off(&(block.number() + 1));
            inner.head = hash;
        }
        debug!(
            target: "chain",
            number = block.number(),
            %hash,
            txs = block.transactions.len(),
            receipts = receipts.len(),
            "inserted block and set head"
        );
        if emit {
            if self.head_feed.send(ChainHeadEvent { block: Arc::new(block.clone()) }).is_err() {
                warn!(target: "chain", "no chain-head subscribers");
            }
        }
        Ok(())
    }

    fn subscribe_chain_head(&self) -> broadcast::Receiver<ChainHeadEvent> {
        self.head_feed.subscribe()
    }

    fn subscribe_chain_side(&self) -> broadcast::Receiver<ChainSideEvent> {
        self.side_feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryState;

    fn base_block(number: u64) -> Block {
        let header = Header {
            number,
            gas_limit: 30_000_000,
            time: 1_000_000,
            ..Default::default()
        };
        Block::new(header, vec![], vec![], &[])
    }

    fn chain_with_base(number: u64) -> InMemoryChain {
        InMemoryChain::new(
            ChainConfig::all_active(1),
            base_block(number),
            Box::new(InMemoryState::new()),
        )
    }

    fn child_of(parent: &Block) -> Block {
        let header = Header {
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            gas_limit: parent.gas_limit(),
            time: parent.time() + 1,
            ..Default::default()
        };
        Block::new(header, vec![], vec![], &[])
    }

    #[test]
    fn head_advances_on_write() {
        let chain = chain_with_base(100);
        let head = chain.current_block();
        let child = child_of(&head);

        chain
            .write_block_and_set_head(&child, &[], &[], Box::new(InMemoryState::new()), false)
            .unwrap();

        assert_eq!(chain.current_block().number(), 101);
        assert_eq!(chain.canonical_hash(101), Some(child.hash()));
        assert!(chain.has_block(child.hash(), 101));
    }

    #[test]
    fn write_emits_head_event() {
        let chain = chain_with_base(100);
        let mut head_rx = chain.subscribe_chain_head();
        let child = child_of(&chain.current_block());

        chain
            .write_block_and_set_head(&child, &[], &[], Box::new(InMemoryState::new()), true)
            .unwrap();

        let event = head_rx.try_recv().unwrap();
        assert_eq!(event.block.number(), 101);
    }

    #[test]
    fn blocks_from_hash_walks_ancestry() {
        let chain = chain_with_base(100);
        let b1 = child_of(&chain.current_block());
        chain
            .write_block_and_set_head(&b1, &[], &[], Box::new(InMemoryState::new()), false)
            .unwrap();
        let b2 = child_of(&b1);
        chain
            .write_block_and_set_head(&b2, &[], &[], Box::new(InMemoryState::new()), false)
            .unwrap();

        let walked = chain.blocks_from_hash(b2.hash(), 7);
        assert_eq!(walked.len(), 3);
        assert_eq!(walked[0].number(), 102);
        assert_eq!(walked[2].number(), 100);
    }

    #[test]
    fn side_import_does_not_move_head() {
        let chain = chain_with_base(100);
        let mut side_rx = chain.subscribe_chain_side();
        let mut side = child_of(&chain.current_block());
        side.header.extra = alloy_primitives::Bytes::from_static(b"side");

        chain.import_side_block(side.clone());

        assert_eq!(chain.current_block().number(), 100);
        assert_eq!(side_rx.try_recv().unwrap().block.hash(), side.hash());
    }

    #[test]
    fn missing_state_reports_root() {
        let chain = chain_with_base(100);
        let missing = B256::repeat_byte(0x99);
        assert_eq!(
            chain.state_at(missing).err(),
            Some(ChainError::StateUnavailable(missing))
        );
    }
}
