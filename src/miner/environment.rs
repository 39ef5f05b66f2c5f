//! The per-attempt sealing environment.
//!
//! An [`Environment`] is the mutable scratchpad of one block-build
//! attempt: the header under construction, the owned execution state,
//! accumulated transactions and receipts, accepted uncles and the
//! ancestry sets that validate them.
//!
//! Ownership discipline: exactly one task mutates an environment at a
//! time, and every shared exposure (snapshot publication, handing work
//! to the sealer) goes through [`Environment::deep_copy`]. Consuming
//! the environment via [`Environment::discard`] or
//! [`Environment::into_task`] stops the state prefetcher exactly once.

use crate::primitives::{copy_receipts, Block, Header, Receipt, Signer, Transaction};
use crate::state::{GasPool, PendingState};
use alloy_primitives::{Address, B256};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Parameters for generating one sealing attempt.
#[derive(Clone, Debug, Default)]
pub(crate) struct GenerateParams {
    /// Requested timestamp for the sealing task.
    pub timestamp: u64,
    /// Whether the given timestamp is immutable.
    pub force_time: bool,
    /// Parent block hash; zero means the latest chain head.
    pub parent_hash: B256,
    /// Fee recipient for included transactions.
    pub coinbase: Address,
    /// Randomness from the beacon chain, zero before the merge.
    pub random: B256,
    /// Whether uncle inclusion is disallowed.
    pub no_uncle: bool,
    /// Whether the extra field must stay empty.
    pub no_extra: bool,
}

/// The worker's current environment, holding all information of the
/// sealing block generation.
pub(crate) struct Environment {
    /// Chain-specific transaction signer.
    pub signer: Signer,
    /// Execution state; changes apply here.
    pub state: Box<dyn PendingState>,
    /// Ancestor hashes, for checking uncle parent validity.
    pub ancestors: HashSet<B256>,
    /// Ancestors plus their uncles, for checking uncle invalidity.
    pub family: HashSet<B256>,
    /// Transactions committed in this cycle.
    pub tcount: usize,
    /// Gas still available for packing transactions.
    pub gas_pool: Option<GasPool>,
    /// Fee recipient.
    pub coinbase: Address,
    /// Header under construction.
    pub header: Header,
    /// Committed transactions, in apply order.
    pub txs: Vec<Transaction>,
    /// Receipts, parallel to `txs`.
    pub receipts: Vec<Receipt>,
    /// Accepted uncles by hash.
    pub uncles: HashMap<B256, Header>,
    /// Build deadline as unix milliseconds (leader mode only).
    pub till: Option<i64>,
    /// Target milliseconds between blocks.
    pub block_interval_ms: u64,
    /// Per-parent gas limit target.
    pub block_gas_limit: u64,
    /// EIP-1559 change-rate denominator for this block.
    pub base_fee_max_change_rate: u64,
    /// Gas target percentage for this block.
    pub gas_target_percentage: u64,
}

impl Environment {
    /// Create a fresh environment over the given state and header.
    pub fn new(
        signer: Signer,
        state: Box<dyn PendingState>,
        coinbase: Address,
        header: Header,
    ) -> Self {
        Self {
            signer,
            state,
            ancestors: HashSet::new(),
            family: HashSet::new(),
            tcount: 0,
            gas_pool: None,
            coinbase,
            header,
            txs: Vec::new(),
            receipts: Vec::new(),
            uncles: HashMap::new(),
            till: None,
            block_interval_ms: 0,
            block_gas_limit: 0,
            base_fee_max_change_rate: 0,
            gas_target_percentage: 0,
        }
    }

    /// A fully independent copy of this environment.
    ///
    /// The state copy starts without a prefetcher; transactions and
    /// uncles are immutable so their clones are cheap.
    pub fn deep_copy(&self) -> Self {
        Self {
            signer: self.signer,
            state: self.state.deep_copy(),
            ancestors: self.ancestors.clone(),
            family: self.family.clone(),
            tcount: self.tcount,
            gas_pool: self.gas_pool,
            coinbase: self.coinbase,
            header: self.header.clone(),
            txs: self.txs.clone(),
            receipts: copy_receipts(&self.receipts),
            uncles: self.uncles.clone(),
            till: self.till,
            block_interval_ms: self.block_interval_ms,
            block_gas_limit: self.block_gas_limit,
            base_fee_max_change_rate: self.base_fee_max_change_rate,
            gas_target_percentage: self.gas_target_percentage,
        }
    }

    /// The accepted uncles in list form.
    pub fn uncle_list(&self) -> Vec<Header> {
        self.uncles.values().cloned().collect()
    }

    /// Tear the environment down, stopping the state prefetcher.
    ///
    /// Must be called on every terminal path; consuming `self` makes a
    /// second stop unrepresentable.
    pub fn discard(mut self) {
        self.state.stop_prefetcher();
    }

    /// Turn the environment into a sealing task over the given
    /// assembled block, stopping the prefetcher on the way.
    pub fn into_task(mut self, block: Block) -> Task {
        self.state.stop_prefetcher();
        Task {
            receipts: self.receipts,
            state: self.state,
            block,
            created_at: Instant::now(),
        }
    }
}

/// The immutable payload handed to the sealer.
pub(crate) struct Task {
    /// Receipts of the assembled block, in apply order.
    pub receipts: Vec<Receipt>,
    /// Final state after the block's transactions.
    pub state: Box<dyn PendingState>,
    /// The assembled, not yet sealed block.
    pub block: Block,
    /// When the task was created.
    pub created_at: Instant,
}
