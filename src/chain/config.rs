//! Chain configuration.

use alloy_primitives::U256;

/// Clique proof-of-authority settings, when the chain runs Clique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CliqueConfig {
    /// Target seconds between blocks; zero means seal on demand.
    pub period: u64,
}

/// Static parameters of the chain the worker seals for.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChainConfig {
    /// Chain id used for replay protection.
    pub chain_id: u64,
    /// Block at which EIP-155 replay protection activates.
    pub eip155_block: Option<u64>,
    /// Block at which EIP-1559 fee markets activate.
    pub london_block: Option<u64>,
    /// Cumulative-difficulty threshold past which PoW rules cease.
    pub terminal_total_difficulty: Option<U256>,
    /// Clique settings when the chain runs proof-of-authority.
    pub clique: Option<CliqueConfig>,
}

impl ChainConfig {
    /// A config with every fork active from genesis.
    pub fn all_active(chain_id: u64) -> Self {
        Self {
            chain_id,
            eip155_block: Some(0),
            london_block: Some(0),
            terminal_total_difficulty: None,
            clique: None,
        }
    }

    /// Whether EIP-155 is active at the given block number.
    pub fn is_eip155(&self, number: u64) -> bool {
        self.eip155_block.is_some_and(|b| b <= number)
    }

    /// Whether EIP-1559 is active at the given block number.
    pub fn is_london(&self, number: u64) -> bool {
        self.london_block.is_some_and(|b| b <= number)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::all_active(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_activation_is_inclusive() {
        let config = ChainConfig { london_block: Some(100), ..ChainConfig::all_active(1) };
        assert!(!config.is_london(99));
        assert!(config.is_london(100));
        assert!(config.is_london(101));
    }

    #[test]
    fn missing_fork_never_activates() {
        let config = ChainConfig { eip155_block: None, ..ChainConfig::all_active(1) };
        assert!(!config.is_eip155(u64::MAX));
    }
}
