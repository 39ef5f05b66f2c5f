//! Locally mined blocks awaiting canonicalness confirmation.

use crate::chain::Blockchain;
use alloy_primitives::B256;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

struct UnconfirmedBlock {
    index: u64,
    hash: B256,
}

/// A ring of blocks this node sealed, checked for canonical status once
/// they are `depth` blocks below the head.
pub(crate) struct UnconfirmedBlocks {
    chain: Arc<dyn Blockchain>,
    depth: u64,
    blocks: Mutex<VecDeque<UnconfirmedBlock>>,
}

impl UnconfirmedBlocks {
    /// Track confirmations `depth` blocks deep against the chain.
    pub fn new(chain: Arc<dyn Blockchain>, depth: u64) -> Self {
        Self { chain, depth, blocks: Mutex::new(VecDeque::new()) }
    }

    /// Register a freshly sealed block, shifting out anything old
    /// enough to judge.
    pub fn insert(&self, index: u64, hash: B256) {
        self.shift(index);
        let mut blocks = self.blocks.lock().expect("unconfirmed lock poisoned");
        blocks.push_back(UnconfirmedBlock { index, hash });
        info!(target: "miner", number = index, %hash, "🔨 mined potential block");
    }

    /// Judge every tracked block at least `depth` below `height`.
    pub fn shift(&self, height: u64) {
        let mut blocks = self.blocks.lock().expect("unconfirmed lock poisoned");
        while let Some(next) = blocks.front() {
            if next.index + self.depth > height {
                break;
            }
            match self.chain.header_by_number(next.index) {
                None => {
                    warn!(target: "miner", number = next.index, hash = %next.hash, "failed to retrieve header of mined block");
                }
                Some(header) if header.hash() == next.hash => {
                    info!(target: "miner", number = next.index, hash = %next.hash, "🔗 block reached canonical chain");
                }
                Some(header) => {
                    info!(target: "miner", number = next.index, hash = %next.hash, canonical = %header.hash(), "⑂ block became a side fork");
                }
            }
            blocks.pop_front();
        }
    }

    /// Number of blocks still awaiting judgement.
    pub fn len(&self) -> usize {
        self.blocks.lock().expect("unconfirmed lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainConfig, InMemoryChain};
    use crate::primitives::{Block, Header};
    use crate::state::InMemoryState;

    fn chain() -> Arc<InMemoryChain> {
        let base = Block::new(
            Header { number: 0, gas_limit: 30_000_000, ..Default::default() },
            vec![],
            vec![],
            &[],
        );
        Arc::new(InMemoryChain::new(
            ChainConfig::all_active(1),
            base,
            Box::new(InMemoryState::new()),
        ))
    }

    #[test]
    fn blocks_wait_until_deep_enough() {
        let set = UnconfirmedBlocks::new(chain(), 7);
        set.insert(1, B256::repeat_byte(0x01));
        set.insert(2, B256::repeat_byte(0x02));
        assert_eq!(set.len(), 2);

        // Height 7: block 1 is not yet 7 deep (1 + 7 > 7).
        set.shift(7);
        assert_eq!(set.len(), 2);

        // Height 8: block 1 is judged and dropped.
        set.shift(8);
        assert_eq!(set.len(), 1);

        set.shift(100);
        assert_eq!(set.len(), 0);
    }
}
