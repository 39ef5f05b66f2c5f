//! Price-and-nonce transaction ordering.
//!
//! Keeps one candidate per sender in a max-heap keyed by effective gas
//! tip, while each sender's remaining transactions wait in nonce order
//! behind it. The committer walks the set with three primitives:
//!
//! - `peek` — the best transaction right now,
//! - `shift` — accept the head and advance within its sender,
//! - `pop` — drop the head *and* the rest of its sender (used when the
//!   sender can no longer make progress in this block).

use crate::primitives::{Signer, Transaction};
use alloy_primitives::Address;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

/// Heap entry: a sender's current head transaction plus its tip.
struct HeadTx {
    tip: u128,
    /// Admission sequence; earlier wins on equal tips.
    seq: u64,
    tx: Transaction,
}

impl PartialEq for HeadTx {
    fn eq(&self, other: &Self) -> bool {
        self.tip == other.tip && self.seq == other.seq
    }
}

impl Eq for HeadTx {}

impl PartialOrd for HeadTx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeadTx {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher tip first, then earlier admission.
        self.tip.cmp(&other.tip).then(other.seq.cmp(&self.seq))
    }
}

/// Transactions ordered by effective tip across senders, nonce-correct
/// within a sender.
pub struct TransactionsByPriceAndNonce {
    heads: BinaryHeap<HeadTx>,
    tails: HashMap<Address, VecDeque<Transaction>>,
    signer: Signer,
    base_fee: Option<u128>,
    next_seq: u64,
}

impl TransactionsByPriceAndNonce {
    /// Build the ordering from a per-sender pending map. Senders whose
    /// head transaction cannot cover the base fee are dropped entirely;
    /// their later nonces could not execute anyway.
    pub fn new(
        signer: Signer,
        pending: HashMap<Address, Vec<Transaction>>,
        base_fee: Option<u128>,
    ) -> Self {
        let mut this = Self {
            heads: BinaryHeap::with_capacity(pending.len()),
            tails: HashMap::with_capacity(pending.len()),
            signer,
            base_fee,
            next_seq: 0,
        };
        // Deterministic admission order keeps equal-tip ties stable.
        let mut senders: Vec<_> = pending.into_iter().collect();
        senders.sort_by_key(|(address, _)| *address);
        for (address, txs) in senders {
            let mut queue: VecDeque<Transaction> = txs.into();
            let Some(head) = queue.pop_front() else { continue };
            let Some(tip) = head.effective_gas_tip(base_fee) else { continue };
            this.heads.push(HeadTx { tip, seq: this.next_seq, tx: head });
            this.next_seq += 1;
            if !queue.is_empty() {
                this.tails.insert(address, queue);
            }
        }
        this
    }

    /// The best transaction, without consuming it.
    pub fn peek(&self) -> Option<&Transaction> {
        self.heads.peek().map(|head| &head.tx)
    }

    /// Accept the head and replace it with its sender's next nonce.
    pub fn shift(&mut self) {
        let Some(head) = self.heads.pop() else { return };
        let sender = self.signer.sender(&head.tx);
        let Some(queue) = self.tails.get_mut(&sender) else { return };
        if let Some(next) = queue.pop_front() {
            if queue.is_empty() {
                self.tails.remove(&sender);
            }
            if let Some(tip) = next.effective_gas_tip(self.base_fee) {
                self.heads.push(HeadTx { tip, seq: self.next_seq, tx: next });
                self.next_seq += 1;
            }
        }
    }

    /// Drop the head and everything else its sender has queued.
    pub fn pop(&mut self) {
        if let Some(head) = self.heads.pop() {
            self.tails.remove(&self.signer.sender(&head.tx));
        }
    }

    /// Whether no candidates remain.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }
}
