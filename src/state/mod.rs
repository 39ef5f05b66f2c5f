//! The state-database seam.
//!
//! Transaction execution and the state trie live outside this crate;
//! the worker only needs the narrow surface the committer depends on:
//! journaled snapshots it can revert to when a transaction fails, deep
//! copies for the pending snapshot, a background prefetcher lifecycle,
//! and transaction application with typed per-transaction errors.
//!
//! [`InMemoryState`] is a minimal account model (nonce + balance) that
//! produces real nonce and gas-limit failures; tests and the dev
//! engine run against it.

mod gas_pool;
mod memory;

pub use gas_pool::GasPool;
pub use memory::InMemoryState;

use crate::primitives::{Header, Receipt, Transaction};
use alloy_primitives::{Address, B256};

/// Errors surfaced by applying a single transaction.
///
/// None of these abort a block build; the committer skips the
/// offending transaction (or the whole sender) and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The block ran out of gas for this transaction.
    #[error("gas limit reached")]
    GasLimitReached,

    /// Transaction nonce is below the account nonce.
    #[error("nonce too low: account {account}, tx {tx}")]
    NonceTooLow {
        /// Current account nonce.
        account: u64,
        /// Nonce carried by the transaction.
        tx: u64,
    },

    /// Transaction nonce is ahead of the account nonce.
    #[error("nonce too high: account {account}, tx {tx}")]
    NonceTooHigh {
        /// Current account nonce.
        account: u64,
        /// Nonce carried by the transaction.
        tx: u64,
    },

    /// The transaction type is not enabled for this chain/block.
    #[error("transaction type not supported")]
    TxTypeNotSupported,

    /// Sender cannot cover gas plus value.
    #[error("insufficient funds for gas * price + value")]
    InsufficientFunds,

    /// Anything else the executor reports.
    #[error("execution failed: {0}")]
    Other(String),
}

/// Mutable execution state for one block-build attempt.
///
/// An implementation wraps the external state database and EVM. The
/// worker owns exactly one live instance per sealing environment;
/// every shared exposure goes through [`PendingState::deep_copy`].
pub trait PendingState: Send + Sync {
    /// Record the hash and index of the transaction about to execute,
    /// so logs and access lists attribute correctly.
    fn prepare(&mut self, tx_hash: B256, tx_index: usize);

    /// Take a revertible snapshot of the current state.
    fn snapshot(&mut self) -> usize;

    /// Roll the state back to a snapshot taken earlier. After the
    /// revert the state is byte-identical to the snapshot point.
    fn revert_to_snapshot(&mut self, id: usize);

    /// Execute a transaction against the current state, drawing gas
    /// from the pool and crediting fees to the coinbase.
    fn apply_transaction(
        &mut self,
        header: &Header,
        coinbase: Address,
        tx: &Transaction,
        gas_pool: &mut GasPool,
    ) -> Result<Receipt, ExecutionError>;

    /// A fully independent copy of this state.
    fn deep_copy(&self) -> Box<dyn PendingState>;

    /// Start the background trie prefetcher under the given namespace.
    fn start_prefetcher(&mut self, namespace: &'static str);

    /// Stop the background trie prefetcher.
    fn stop_prefetcher(&mut self);

    /// Root hash of the current state.
    fn state_root(&self) -> B256;
}
