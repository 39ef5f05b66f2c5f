//! In-memory account state.
//!
//! A deliberately small stand-in for the external state database: flat
//! accounts with nonce and balance, full-copy snapshots, and a value
//! transfer as the only "EVM". It produces the same per-transaction
//! error kinds a real executor does, which is all the committer cares
//! about.

use super::{ExecutionError, GasPool, PendingState};
use crate::primitives::{Header, Log, Receipt, Transaction, TX_GAS};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::Encodable;
use std::collections::BTreeMap;
use tracing::trace;

/// Gas charged per byte of call data.
const DATA_GAS_PER_BYTE: u64 = 16;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Account {
    nonce: u64,
    balance: U256,
}

/// In-memory [`PendingState`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryState {
    accounts: BTreeMap<Address, Account>,
    journal: Vec<BTreeMap<Address, Account>>,
    tx_context: Option<(B256, usize)>,
    prefetching: bool,
}

impl InMemoryState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account, builder style.
    pub fn with_account(mut self, address: Address, nonce: u64, balance: U256) -> Self {
        self.accounts.insert(address, Account { nonce, balance });
        self
    }

    /// Current balance of an account (zero if absent).
    pub fn balance_of(&self, address: Address) -> U256 {
        self.accounts.get(&address).map(|a| a.balance).unwrap_or_default()
    }

    /// Current nonce of an account (zero if absent).
    pub fn nonce_of(&self, address: Address) -> u64 {
        self.accounts.get(&address).map(|a| a.nonce).unwrap_or_default()
    }
}

impl PendingState for InMemoryState {
    fn prepare(&mut self, tx_hash: B256, tx_index: usize) {
        self.tx_context = Some((tx_hash, tx_index));
    }

    fn snapshot(&mut self) -> usize {
        self.journal.push(self.accounts.clone());
        self.journal.len() - 1
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        if id < self.journal.len() {
            self.accounts = self.journal[id].clone();
            self.journal.truncate(id);
        }
    }

    fn apply_transaction(
        &mut self,
        header: &Header,
        coinbase: Address,
        tx: &Transaction,
        gas_pool: &mut GasPool,
    ) -> Result<Receipt, ExecutionError> {
        let sender = self.accounts.entry(tx.from).or_default().clone();
        if tx.nonce < sender.nonce {
            return Err(ExecutionError::NonceTooLow { account: sender.nonce, tx: tx.nonce });
        }
        if tx.nonce > sender.nonce {
            return Err(ExecutionError::NonceTooHigh { account: sender.nonce, tx: tx.nonce });
        }

        let gas_used = TX_GAS + DATA_GAS_PER_BYTE * tx.input.len() as u64;
        if gas_used > tx.gas_limit {
            return Err(ExecutionError::Other("intrinsic gas too low".into()));
        }

        let tip = tx.effective_gas_tip(header.base_fee).ok_or_else(|| {
            ExecutionError::Other("max fee per gas less than block base fee".into())
        })?;
        let price = header.base_fee.unwrap_or_default() + tip;
        let cost = U256::from(price) * U256::from(gas_used) + tx.value;
        if sender.balance < cost {
            return Err(ExecutionError::InsufficientFunds);
        }

        // The whole gas limit is bought up front and the unused part
        // refunded, so an over-limit transaction fails before touching
        // accounts.
        gas_pool.sub_gas(tx.gas_limit)?;
        gas_pool.add_gas(tx.gas_limit - gas_used);

        let from = self.accounts.entry(tx.from).or_default();
        from.nonce += 1;
        from.balance -= cost;
        self.accounts.entry(tx.to).or_default().balance += tx.value;
        self.accounts.entry(coinbase).or_default().balance +=
            U256::from(tip) * U256::from(gas_used);

        let (tx_hash, tx_index) = self.tx_context.take().unwrap_or((tx.hash(), 0));
        let log = Log {
            address: tx.to,
            topics: vec![],
            data: tx.input.clone(),
            block_number: header.number,
            tx_hash,
            tx_index: tx_index as u64,
            block_hash: B256::ZERO,
        };
        Ok(Receipt {
            status: 1,
            cumulative_gas_used: header.gas_used + gas_used,
            gas_used,
            tx_hash,
            logs: vec![log],
            ..Default::default()
        })
    }

    fn deep_copy(&self) -> Box<dyn PendingState> {
        Box::new(Self {
            accounts: self.accounts.clone(),
            journal: Vec::new(),
            tx_context: self.tx_context,
            prefetching: false,
        })
    }

    fn start_prefetcher(&mut self, namespace: &'static str) {
        trace!(target: "state", namespace, "starting trie prefetcher");
        self.prefetching = true;
    }

    fn stop_prefetcher(&mut self) {
        if self.prefetching {
            trace!(target: "state", "stopping trie prefetcher");
            self.prefetching = false;
        }
    }

    fn state_root(&self) -> B256 {
        let mut buf = Vec::new();
        for (address, account) in &self.accounts {
            address.encode(&mut buf);
            account.nonce.encode(&mut buf);
            account.balance.encode(&mut buf);
        }
        keccak256(&buf)
    }
}
