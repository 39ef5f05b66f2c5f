//! The transaction-pool seam and block-packing orderings.
//!
//! The pool itself (admission, replacement, eviction) is external; the
//! worker consumes three things: the pending set grouped by sender, the
//! local-account list, and a new-transactions feed.
//!
//! Two packing orders are provided for the committer:
//!
//! - [`TransactionsByPriceAndNonce`] — descending effective-tip order
//!   across senders while respecting each sender's nonce sequence, with
//!   the `peek` / `pop` / `shift` navigation the committer drives.
//! - [`TxOrderer`] — fair round-robin across senders with a bounded
//!   look-ahead window and internal committed-hash tracking, used by
//!   the deadline-driven build path.

mod memory;
mod orderer;
mod ordering;

pub use memory::InMemoryPool;
pub use orderer::TxOrderer;
pub use ordering::TransactionsByPriceAndNonce;

use crate::chain::NewTxsEvent;
use crate::primitives::Transaction;
use alloy_primitives::Address;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Size of the new-transactions feed, referenced from the size of the
/// pool itself.
pub const TX_CHAN_SIZE: usize = 102_400;

/// Read access to the transaction pool.
pub trait TransactionPool: Send + Sync {
    /// The pending set, grouped by sender and nonce-ordered within each
    /// sender. `include_locals` folds locally submitted transactions in.
    fn pending(&self, include_locals: bool) -> HashMap<Address, Vec<Transaction>>;

    /// Accounts the node treats as local.
    fn locals(&self) -> Vec<Address>;

    /// Subscribe to newly admitted transactions.
    fn subscribe_new_txs(&self) -> broadcast::Receiver<NewTxsEvent>;
}
