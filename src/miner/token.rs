//! The mining-token seam.
//!
//! In leader mode an external service arbitrates who may produce the
//! next block: the worker acquires a token for `(height, parent)`
//! before building and releases it once the sealed block is written
//! (or leadership is lost). The same service hands out the per-block
//! build parameters governance keeps adjusting.

use alloy_primitives::B256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors surfaced by the mining-token service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token is currently held elsewhere.
    #[error("mining token held by another node")]
    HeldElsewhere,

    /// The arbitration backend is unreachable.
    #[error("token service unavailable: {0}")]
    Unavailable(String),
}

/// Per-block build parameters, looked up for each parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockBuildParameters {
    /// Target milliseconds between blocks.
    pub block_interval_ms: u64,
    /// Gas limit target for the next block.
    pub block_gas_limit: u64,
    /// EIP-1559 change-rate denominator.
    pub base_fee_max_change_rate: u64,
    /// Gas target as a percentage of the gas limit.
    pub gas_target_percentage: u64,
}

impl Default for BlockBuildParameters {
    fn default() -> Self {
        Self {
            block_interval_ms: 1_000,
            block_gas_limit: 30_000_000,
            base_fee_max_change_rate: 8,
            gas_target_percentage: 50,
        }
    }
}

/// External leader election and build-parameter source.
pub trait MiningTokenService: Send + Sync {
    /// Whether the chain runs legacy proof-of-work (no tokens).
    fn is_pow(&self) -> bool;

    /// Try to acquire the right to produce block `height` on top of
    /// `parent_hash`. `Ok(false)` means another node leads this round.
    fn acquire_mining_token(&self, height: u64, parent_hash: B256) -> Result<bool, TokenError>;

    /// Release the token after the block was written (or abandoned).
    fn release_mining_token(
        &self,
        number: u64,
        hash: B256,
        parent_hash: B256,
    ) -> Result<(), TokenError>;

    /// Whether this node currently holds the token.
    fn has_mining_token(&self) -> bool;

    /// Per-block build parameters for the block following `number`.
    fn block_build_parameters(&self, number: u64) -> BlockBuildParameters;
}

/// A token service that arbitrates locally: the token is always free
/// unless a test denies it. Records released tokens for assertions.
pub struct LocalTokenService {
    pow: bool,
    params: BlockBuildParameters,
    held: AtomicBool,
    deny: AtomicBool,
    released: Mutex<Vec<(u64, B256, B256)>>,
}

impl LocalTokenService {
    /// A service for a proof-of-work chain (tokens unused).
    pub fn pow() -> Self {
        Self {
            pow: true,
            params: BlockBuildParameters::default(),
            held: AtomicBool::new(false),
            deny: AtomicBool::new(false),
            released: Mutex::new(Vec::new()),
        }
    }

    /// A service for a leader-mode chain with the given parameters.
    pub fn leader(params: BlockBuildParameters) -> Self {
        Self {
            pow: false,
            params,
            held: AtomicBool::new(false),
            deny: AtomicBool::new(false),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Deny further acquisitions, simulating leadership loss.
    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Tokens released so far, as `(number, hash, parent_hash)`.
    pub fn released(&self) -> Vec<(u64, B256, B256)> {
        self.released.lock().expect("token lock poisoned").clone()
    }
}

impl MiningTokenService for LocalTokenService {
    fn is_pow(&self) -> bool {
        self.pow
    }

    fn acquire_mining_token(&self, _height: u64, _parent_hash: B256) -> Result<bool, TokenError> {
        if self.deny.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.held.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn release_mining_token(
        &self,
        number: u64,
        hash: B256,
        parent_hash: B256,
    ) -> Result<(), TokenError> {
        self.held.store(false, Ordering::SeqCst);
        self.released
            .lock()
            .expect("token lock poisoned")
            .push((number, hash, parent_hash));
        Ok(())
    }

    fn has_mining_token(&self) -> bool {
        self.pow || self.held.load(Ordering::SeqCst)
    }

    fn block_build_parameters(&self, _number: u64) -> BlockBuildParameters {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycle() {
        let service = LocalTokenService::leader(BlockBuildParameters::default());
        assert!(!service.has_mining_token());
        assert!(service.acquire_mining_token(101, B256::ZERO).unwrap());
        assert!(service.has_mining_token());

        service
            .release_mining_token(101, B256::repeat_byte(0x01), B256::ZERO)
            .unwrap();
        assert!(!service.has_mining_token());
        assert_eq!(service.released().len(), 1);
    }

    #[test]
    fn denial_simulates_lost_leadership() {
        let service = LocalTokenService::leader(BlockBuildParameters::default());
        service.set_deny(true);
        assert!(!service.acquire_mining_token(101, B256::ZERO).unwrap());
        assert!(!service.has_mining_token());
    }

    #[test]
    fn pow_service_always_holds() {
        let service = LocalTokenService::pow();
        assert!(service.is_pow());
        assert!(service.has_mining_token());
    }
}
