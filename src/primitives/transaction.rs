//! Transaction type and sender resolution.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};

/// Gas cost of a plain value transfer, the floor for any transaction.
pub const TX_GAS: u64 = 21_000;

/// A pool transaction as seen by the sealing worker.
///
/// Signature recovery happens at pool admission; the recovered sender
/// travels with the transaction so the worker never touches crypto.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    /// Chain id the transaction is bound to; zero means a pre-EIP-155
    /// unprotected legacy transaction.
    pub chain_id: u64,
    /// Sender account nonce.
    pub nonce: u64,
    /// Maximum total fee per gas the sender is willing to pay.
    pub max_fee_per_gas: u128,
    /// Maximum tip per gas going to the block producer.
    pub max_priority_fee_per_gas: u128,
    /// Gas limit for execution.
    pub gas_limit: u64,
    /// Recipient; the zero address denotes contract creation.
    pub to: Address,
    /// Transferred value in wei.
    pub value: U256,
    /// Call data.
    pub input: Bytes,
    /// Sender, recovered at pool admission.
    pub from: Address,
}

impl Transaction {
    /// The transaction hash.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        keccak256(&buf)
    }

    /// Whether the transaction is EIP-155 replay protected.
    pub fn protected(&self) -> bool {
        self.chain_id != 0
    }

    /// Effective tip per gas going to the producer at the given base
    /// fee. `None` if the transaction cannot cover the base fee.
    pub fn effective_gas_tip(&self, base_fee: Option<u128>) -> Option<u128> {
        match base_fee {
            None => Some(self.max_priority_fee_per_gas),
            Some(base_fee) => {
                if self.max_fee_per_gas < base_fee {
                    return None;
                }
                Some(self.max_priority_fee_per_gas.min(self.max_fee_per_gas - base_fee))
            }
        }
    }
}

/// Chain-specific transaction signer.
///
/// The worker uses it to group pending transactions by sender; the
/// actual signature checks belong to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signer {
    /// Chain id used for replay protection.
    pub chain_id: u64,
}

impl Signer {
    /// Create a signer for the given chain.
    pub const fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// The sender of the transaction.
    pub fn sender(&self, tx: &Transaction) -> Address {
        tx.from
    }
}
