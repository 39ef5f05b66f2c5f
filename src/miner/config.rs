//! Miner configuration.

use alloy_primitives::{Address, Bytes};
use std::time::Duration;

/// Default interval for recreating the sealing block with newly
/// arrived transactions.
pub const DEFAULT_RECOMMIT_INTERVAL: Duration = Duration::from_secs(3);

/// Default gas ceiling.
pub const DEFAULT_GAS_CEIL: u64 = 30_000_000;

/// Default minimum gas price (1 gwei).
pub const DEFAULT_GAS_PRICE: u128 = 1_000_000_000;

/// Default minimum wall-clock time spent filling a block, in ms.
pub const DEFAULT_BLOCK_MIN_BUILD_TIME_MS: i64 = 100;

/// Default trailing margin shaved off a build deadline, in ms.
pub const DEFAULT_BLOCK_TRAIL_TIME_MS: i64 = 200;

/// Default look-back base for block-time adjustment probes.
pub const DEFAULT_BLOCK_TIME_ADJ_BLOCKS: i64 = 10;

/// Default number of decades the look-back base is scaled through.
pub const DEFAULT_BLOCK_TIME_ADJ_MULTIPLE: i64 = 3;

/// Miner configuration.
///
/// `coinbase`, `extra_data` and `gas_ceil` seed the worker's mutable
/// parameters and can be changed at runtime through the worker API;
/// everything else is fixed for the worker's lifetime.
#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Fee recipient for sealed blocks.
    pub coinbase: Address,

    /// Gas ceiling for blocks (PoW mode; leader mode takes the limit
    /// from the per-block build parameters).
    pub gas_ceil: u64,

    /// Minimum gas price to accept transactions.
    pub gas_price: u128,

    /// Extra data (vanity) to include in blocks.
    pub extra_data: Bytes,

    /// Interval for recommitting the sealing block.
    pub recommit: Duration,

    /// Hard cap on transactions per block; zero means unlimited.
    pub max_txs_per_block: usize,

    /// Minimum number of committed transactions before a build deadline
    /// may terminate the committer.
    pub block_min_build_txs: usize,

    /// Minimum wall-clock time a deadline-bounded build runs, in ms.
    pub block_min_build_time_ms: i64,

    /// Margin subtracted from on-schedule deadlines so the block lands
    /// inside its second, in ms.
    pub block_trail_time_ms: i64,

    /// Look-back base for the pacing controller's vote loop.
    pub block_time_adj_blocks: i64,

    /// Number of decades the look-back base scales through.
    pub block_time_adj_multiple: i64,

    /// Look-ahead window of the round-robin orderer; zero selects the
    /// price+nonce ordering instead.
    pub prefetch_count: usize,
}

impl MinerConfig {
    /// A configuration with defaults for everything but the coinbase.
    pub fn new(coinbase: Address) -> Self {
        Self {
            coinbase,
            gas_ceil: DEFAULT_GAS_CEIL,
            gas_price: DEFAULT_GAS_PRICE,
            extra_data: Bytes::default(),
            recommit: DEFAULT_RECOMMIT_INTERVAL,
            max_txs_per_block: 0,
            block_min_build_txs: 0,
            block_min_build_time_ms: DEFAULT_BLOCK_MIN_BUILD_TIME_MS,
            block_trail_time_ms: DEFAULT_BLOCK_TRAIL_TIME_MS,
            block_time_adj_blocks: DEFAULT_BLOCK_TIME_ADJ_BLOCKS,
            block_time_adj_multiple: DEFAULT_BLOCK_TIME_ADJ_MULTIPLE,
            prefetch_count: 0,
        }
    }

    /// Set the gas ceiling.
    pub fn with_gas_ceil(mut self, gas_ceil: u64) -> Self {
        self.gas_ceil = gas_ceil;
        self
    }

    /// Set the minimum gas price.
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Set the extra data (vanity).
    pub fn with_extra_data(mut self, extra_data: Bytes) -> Self {
        self.extra_data = extra_data;
        self
    }

    /// Set the recommit interval.
    pub fn with_recommit(mut self, recommit: Duration) -> Self {
        self.recommit = recommit;
        self
    }

    /// Cap the number of transactions per block.
    pub fn with_max_txs_per_block(mut self, max: usize) -> Self {
        self.max_txs_per_block = max;
        self
    }

    /// Require a transaction count before deadlines may fire.
    pub fn with_block_min_build_txs(mut self, min: usize) -> Self {
        self.block_min_build_txs = min;
        self
    }

    /// Set the minimum build time in ms.
    pub fn with_block_min_build_time_ms(mut self, ms: i64) -> Self {
        self.block_min_build_time_ms = ms;
        self
    }

    /// Set the deadline trailing margin in ms.
    pub fn with_block_trail_time_ms(mut self, ms: i64) -> Self {
        self.block_trail_time_ms = ms;
        self
    }

    /// Set the orderer look-ahead; zero selects price+nonce ordering.
    pub fn with_prefetch_count(mut self, count: usize) -> Self {
        self.prefetch_count = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MinerConfig::new(Address::repeat_byte(0x01));
        assert_eq!(config.gas_ceil, DEFAULT_GAS_CEIL);
        assert_eq!(config.recommit, DEFAULT_RECOMMIT_INTERVAL);
        assert_eq!(config.max_txs_per_block, 0);
        assert_eq!(config.prefetch_count, 0);
    }

    #[test]
    fn builder_overrides() {
        let config = MinerConfig::new(Address::repeat_byte(0x01))
            .with_gas_ceil(50_000_000)
            .with_recommit(Duration::from_secs(5))
            .with_block_min_build_txs(10)
            .with_prefetch_count(64);

        assert_eq!(config.gas_ceil, 50_000_000);
        assert_eq!(config.recommit, Duration::from_secs(5));
        assert_eq!(config.block_min_build_txs, 10);
        assert_eq!(config.prefetch_count, 64);
    }
}
