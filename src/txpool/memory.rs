//! In-memory transaction pool.

use super::{TransactionPool, TX_CHAN_SIZE};
use crate::chain::NewTxsEvent;
use crate::primitives::Transaction;
use alloy_primitives::Address;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::broadcast;

/// A minimal pool for tests and local development: nonce-ordered
/// per-sender queues and a new-transactions feed. Admission checks are
/// assumed to have happened elsewhere.
pub struct InMemoryPool {
    pending: RwLock<HashMap<Address, Vec<Transaction>>>,
    locals: RwLock<HashSet<Address>>,
    feed: broadcast::Sender<NewTxsEvent>,
}

impl InMemoryPool {
    /// An empty pool with the default feed capacity.
    pub fn new() -> Self {
        Self::with_channel_capacity(TX_CHAN_SIZE)
    }

    /// An empty pool with an explicit feed capacity.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity);
        Self {
            pending: RwLock::new(HashMap::new()),
            locals: RwLock::new(HashSet::new()),
            feed,
        }
    }

    /// Admit a transaction and announce it.
    pub fn add_transaction(&self, tx: Transaction) {
        {
            let mut pending = self.pending.write().expect("pool lock poisoned");
            let queue = pending.entry(tx.from).or_default();
            queue.push(tx.clone());
            queue.sort_by_key(|t| t.nonce);
        }
        let _ = self.feed.send(NewTxsEvent { txs: vec![tx] });
    }

    /// Admit a batch and announce it as one event.
    pub fn add_transactions(&self, txs: Vec<Transaction>) {
        {
            let mut pending = self.pending.write().expect("pool lock poisoned");
            for tx in &txs {
                let queue = pending.entry(tx.from).or_default();
                queue.push(tx.clone());
                queue.sort_by_key(|t| t.nonce);
            }
        }
        let _ = self.feed.send(NewTxsEvent { txs });
    }

    /// Mark an account as local.
    pub fn add_local(&self, address: Address) {
        self.locals.write().expect("pool lock poisoned").insert(address);
    }

    /// Drop every pending transaction.
    pub fn clear(&self) {
        self.pending.write().expect("pool lock poisoned").clear();
    }
}

impl Default for InMemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionPool for InMemoryPool {
    fn pending(&self, include_locals: bool) -> HashMap<Address, Vec<Transaction>> {
        let pending = self.pending.read().expect("pool lock poisoned");
        if include_locals {
            return pending.clone();
        }
        let locals = self.locals.read().expect("pool lock poisoned");
        pending
            .iter()
            .filter(|(address, _)| !locals.contains(*address))
            .map(|(address, txs)| (*address, txs.clone()))
            .collect()
    }

    fn locals(&self) -> Vec<Address> {
        self.locals.read().expect("pool lock poisoned").iter().copied().collect()
    }

    fn subscribe_new_txs(&self) -> broadcast::Receiver<NewTxsEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(from: Address, nonce: u64) -> Transaction {
        Transaction { from, nonce, gas_limit: 21_000, ..Default::default() }
    }

    #[test]
    fn pending_is_nonce_ordered() {
        let pool = InMemoryPool::with_channel_capacity(16);
        let sender = Address::repeat_byte(0x01);
        pool.add_transaction(tx(sender, 2));
        pool.add_transaction(tx(sender, 0));
        pool.add_transaction(tx(sender, 1));

        let pending = pool.pending(true);
        let nonces: Vec<u64> = pending[&sender].iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[test]
    fn announces_admissions() {
        let pool = InMemoryPool::with_channel_capacity(16);
        let mut feed = pool.subscribe_new_txs();
        pool.add_transaction(tx(Address::repeat_byte(0x01), 0));

        let event = feed.try_recv().unwrap();
        assert_eq!(event.txs.len(), 1);
    }

    #[test]
    fn locals_are_excluded_on_request() {
        let pool = InMemoryPool::with_channel_capacity(16);
        let local = Address::repeat_byte(0x01);
        let remote = Address::repeat_byte(0x02);
        pool.add_local(local);
        pool.add_transaction(tx(local, 0));
        pool.add_transaction(tx(remote, 0));

        assert_eq!(pool.pending(true).len(), 2);
        let remotes = pool.pending(false);
        assert_eq!(remotes.len(), 1);
        assert!(remotes.contains_key(&remote));
    }
}
