//! Round-robin transaction ordering with look-ahead.
//!
//! Alternative to the price-heap ordering: senders are served one
//! transaction at a time in rotation, which keeps a single hot sender
//! from monopolizing a block. A bounded ready window of upcoming
//! transactions gives the execution layer something to prefetch
//! against. Committed hashes are tracked inside the orderer so
//! repeated build rounds over the same pending set skip work already
//! in the block.

use crate::primitives::Transaction;
use alloy_primitives::{Address, B256};
use std::collections::{HashSet, VecDeque};

/// Fair-ordered view over the pending set for one build round.
pub struct TxOrderer {
    /// Per-sender queues, rotated as heads are taken.
    queues: VecDeque<(Address, VecDeque<Transaction>)>,
    /// Look-ahead window the committer consumes from.
    ready: VecDeque<Transaction>,
    /// Hashes committed in this and previous rounds.
    committed: HashSet<B256>,
    /// Target size of the ready window.
    prefetch: usize,
}

impl TxOrderer {
    /// Build an orderer over the pending set, skipping transactions
    /// whose hashes are already in `committed`.
    pub fn new(
        pending: std::collections::HashMap<Address, Vec<Transaction>>,
        committed: HashSet<B256>,
        prefetch: usize,
    ) -> Self {
        let mut senders: Vec<_> = pending.into_iter().collect();
        senders.sort_by_key(|(address, _)| *address);

        let mut queues = VecDeque::with_capacity(senders.len());
        for (address, txs) in senders {
            let queue: VecDeque<Transaction> = txs
                .into_iter()
                .filter(|tx| !committed.contains(&tx.hash()))
                .collect();
            if !queue.is_empty() {
                queues.push_back((address, queue));
            }
        }
        let mut this = Self { queues, ready: VecDeque::new(), committed, prefetch: prefetch.max(1) };
        this.fill_ready();
        this
    }

    /// Top the ready window back up to the prefetch target, taking one
    /// transaction per sender in rotation.
    fn fill_ready(&mut self) {
        while self.ready.len() < self.prefetch {
            let Some((address, mut queue)) = self.queues.pop_front() else { break };
            if let Some(tx) = queue.pop_front() {
                self.ready.push_back(tx);
            }
            if !queue.is_empty() {
                self.queues.push_back((address, queue));
            }
        }
    }

    /// The next transaction in rotation, without consuming it.
    pub fn peek(&self) -> Option<&Transaction> {
        self.ready.front()
    }

    /// Accept the head and move to the next sender in rotation.
    pub fn shift(&mut self) {
        self.ready.pop_front();
        self.fill_ready();
    }

    /// Drop the head and every other queued transaction of its sender.
    pub fn pop(&mut self) {
        let Some(head) = self.ready.pop_front() else { return };
        let sender = head.from;
        self.ready.retain(|tx| tx.from != sender);
        self.queues.retain(|(address, _)| *address != sender);
        self.fill_ready();
    }

    /// Record a transaction as committed to the block under build.
    pub fn mark_committed(&mut self, tx: &Transaction) {
        self.committed.insert(tx.hash());
    }

    /// Number of transactions committed so far, across rounds.
    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    /// Hand the committed set back for the next round.
    pub fn into_committed(self) -> HashSet<B256> {
        self.committed
    }
}
