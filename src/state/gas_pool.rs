//! Gas accounting for a block under construction.

use super::ExecutionError;

/// Tracks the gas still available to transactions of the block
/// currently being built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPool(u64);

impl GasPool {
    /// A pool holding the given amount of gas.
    pub const fn new(gas: u64) -> Self {
        Self(gas)
    }

    /// Remaining gas.
    pub const fn gas(&self) -> u64 {
        self.0
    }

    /// Return unused gas to the pool.
    pub fn add_gas(&mut self, amount: u64) -> &mut Self {
        self.0 = self.0.saturating_add(amount);
        self
    }

    /// Draw gas from the pool; fails when the pool cannot cover it.
    pub fn sub_gas(&mut self, amount: u64) -> Result<(), ExecutionError> {
        if self.0 < amount {
            return Err(ExecutionError::GasLimitReached);
        }
        self.0 -= amount;
        Ok(())
    }
}

impl std::fmt::Display for GasPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_and_refunds() {
        let mut pool = GasPool::new(100_000);
        pool.sub_gas(21_000).unwrap();
        assert_eq!(pool.gas(), 79_000);
        pool.add_gas(1_000);
        assert_eq!(pool.gas(), 80_000);
    }

    #[test]
    fn overdraw_is_gas_limit_reached() {
        let mut pool = GasPool::new(20_000);
        assert_eq!(pool.sub_gas(21_000), Err(ExecutionError::GasLimitReached));
        assert_eq!(pool.gas(), 20_000);
    }
}
