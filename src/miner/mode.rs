//! The dual sealing policies.
//!
//! One worker serves two chains: legacy proof-of-work (uncles,
//! pre-sealed empty blocks, interrupt-driven resubmits) and the
//! token-based leader mode (cooperative leadership, deadline-paced
//! builds, synchronous sealing). [`SealingMode`] answers the policy
//! questions so the commit skeleton stays shared; the mode is fixed
//! for the worker's lifetime.

use super::config::MinerConfig;
use super::error::MinerError;
use super::pacing;
use super::token::{MiningTokenService, TokenError};
use crate::chain::Blockchain;
use alloy_primitives::B256;

/// The scheduling policy the worker runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SealingMode {
    /// Legacy proof-of-work with uncles and asynchronous sealing.
    Pow,
    /// Token-arbitrated leader mode with synchronous sealing.
    Leader,
}

impl SealingMode {
    /// Derive the mode from the token service.
    pub fn from_service(tokens: &dyn MiningTokenService) -> Self {
        if tokens.is_pow() {
            Self::Pow
        } else {
            Self::Leader
        }
    }

    /// Whether this is the proof-of-work policy.
    pub fn is_pow(&self) -> bool {
        matches!(self, Self::Pow)
    }

    /// Whether uncle blocks may be included.
    pub fn use_uncles(&self) -> bool {
        self.is_pow()
    }

    /// Whether an empty block is pre-sealed while transactions fill.
    pub fn should_preseal(&self) -> bool {
        self.is_pow()
    }

    /// Whether sealing happens inline on the commit path instead of
    /// through the task loop.
    pub fn seals_synchronously(&self) -> bool {
        !self.is_pow()
    }

    /// Whether in-flight builds are interruptible.
    pub fn interrupts_enabled(&self) -> bool {
        self.is_pow()
    }

    /// Pick the timestamp (and, in leader mode, the build deadline) for
    /// a block on top of the current head.
    pub(crate) fn pick_timestamp(
        &self,
        chain: &dyn Blockchain,
        block_interval_ms: u64,
        config: &MinerConfig,
        requested: u64,
        force_time: bool,
        parent_time: u64,
    ) -> Result<(u64, Option<i64>), MinerError> {
        match self {
            Self::Pow => {
                if parent_time >= requested {
                    if force_time {
                        return Err(MinerError::InvalidTimestamp {
                            parent: parent_time,
                            given: requested,
                        });
                    }
                    return Ok((parent_time + 1, None));
                }
                Ok((requested, None))
            }
            Self::Leader => {
                let (timestamp, till) = pacing::time_it(chain, block_interval_ms, config);
                Ok((timestamp, Some(till)))
            }
        }
    }

    /// Acquire the right to build the next block. Trivially granted
    /// under proof-of-work.
    pub fn acquire_leadership(
        &self,
        tokens: &dyn MiningTokenService,
        height: u64,
        parent_hash: B256,
    ) -> Result<bool, TokenError> {
        match self {
            Self::Pow => Ok(true),
            Self::Leader => tokens.acquire_mining_token(height, parent_hash),
        }
    }

    /// Release leadership after the block was written or abandoned.
    pub fn release_leadership(
        &self,
        tokens: &dyn MiningTokenService,
        number: u64,
        hash: B256,
        parent_hash: B256,
    ) -> Result<(), TokenError> {
        match self {
            Self::Pow => Ok(()),
            Self::Leader => tokens.release_mining_token(number, hash, parent_hash),
        }
    }

    /// Whether this node may commit sealing work right now.
    pub fn has_leadership(&self, tokens: &dyn MiningTokenService) -> bool {
        match self {
            Self::Pow => true,
            Self::Leader => tokens.has_mining_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::token::{BlockBuildParameters, LocalTokenService};

    #[test]
    fn policy_matrix() {
        assert!(SealingMode::Pow.use_uncles());
        assert!(SealingMode::Pow.should_preseal());
        assert!(SealingMode::Pow.interrupts_enabled());
        assert!(!SealingMode::Pow.seals_synchronously());

        assert!(!SealingMode::Leader.use_uncles());
        assert!(!SealingMode::Leader.should_preseal());
        assert!(!SealingMode::Leader.interrupts_enabled());
        assert!(SealingMode::Leader.seals_synchronously());
    }

    #[test]
    fn mode_follows_service() {
        let pow = LocalTokenService::pow();
        assert_eq!(SealingMode::from_service(&pow), SealingMode::Pow);

        let leader = LocalTokenService::leader(BlockBuildParameters::default());
        assert_eq!(SealingMode::from_service(&leader), SealingMode::Leader);
    }

    #[test]
    fn pow_timestamp_bumps_past_parent() {
        let mode = SealingMode::Pow;
        let chain = crate::chain::InMemoryChain::new(
            crate::chain::ChainConfig::all_active(1),
            crate::primitives::Block::default(),
            Box::new(crate::state::InMemoryState::new()),
        );
        let config = MinerConfig::new(alloy_primitives::Address::ZERO);

        // Requested timestamp at or before the parent's is bumped.
        let (ts, till) = mode.pick_timestamp(&chain, 0, &config, 100, false, 100).unwrap();
        assert_eq!(ts, 101);
        assert!(till.is_none());

        // Unless the caller forced it, which is an error.
        let err = mode.pick_timestamp(&chain, 0, &config, 100, true, 100);
        assert!(matches!(err, Err(MinerError::InvalidTimestamp { parent: 100, given: 100 })));
    }
}
