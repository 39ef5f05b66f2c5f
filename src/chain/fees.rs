//! Gas-limit and base-fee arithmetic.

use crate::primitives::Header;

/// EIP-1559 gas-limit elasticity over the gas target.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Base fee on the EIP-1559 activation block, in wei.
pub const INITIAL_BASE_FEE: u128 = 1_000_000_000;

/// The gas limit may move by at most parent/1024 per block.
const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Absolute floor for the block gas limit.
const MIN_GAS_LIMIT: u64 = 5_000;

/// Compute the gas limit of the next block, moving from the parent's
/// limit toward the desired limit by at most the bound divisor step.
pub fn calc_gas_limit(parent_gas_limit: u64, desired_limit: u64) -> u64 {
    let delta = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR - 1;
    let desired = desired_limit.max(MIN_GAS_LIMIT);
    if parent_gas_limit < desired {
        return (parent_gas_limit + delta).min(desired);
    }
    if parent_gas_limit > desired {
        return (parent_gas_limit - delta).max(desired);
    }
    parent_gas_limit
}

/// Compute the EIP-1559 base fee of the block following `parent`.
///
/// `parent_is_london` distinguishes the activation block (which gets
/// [`INITIAL_BASE_FEE`]) from steady state. The change-rate denominator
/// and the gas-target percentage come from the per-block build
/// parameters; a denominator of 8 and a target of 50% reproduce the
/// Ethereum mainnet schedule.
pub fn calc_base_fee(
    parent: &Header,
    parent_is_london: bool,
    max_change_rate: u64,
    gas_target_percentage: u64,
) -> u128 {
    if !parent_is_london {
        return INITIAL_BASE_FEE;
    }
    let parent_base_fee = parent.base_fee.unwrap_or(INITIAL_BASE_FEE);
    let gas_target = parent.gas_limit as u128 * gas_target_percentage as u128 / 100;
    if gas_target == 0 {
        return parent_base_fee;
    }
    let denominator = max_change_rate.max(1) as u128;
    let gas_used = parent.gas_used as u128;

    if gas_used == gas_target {
        parent_base_fee
    } else if gas_used > gas_target {
        let delta =
            (parent_base_fee * (gas_used - gas_target) / gas_target / denominator).max(1);
        parent_base_fee + delta
    } else {
        let delta = parent_base_fee * (gas_target - gas_used) / gas_target / denominator;
        parent_base_fee.saturating_sub(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_limit_converges_upward_bounded() {
        let parent = 30_000_000u64;
        let next = calc_gas_limit(parent, 60_000_000);
        assert_eq!(next, parent + parent / 1024 - 1);
    }

    #[test]
    fn gas_limit_converges_downward_bounded() {
        let parent = 30_000_000u64;
        let next = calc_gas_limit(parent, 10_000_000);
        assert_eq!(next, parent - (parent / 1024 - 1));
    }

    #[test]
    fn gas_limit_lands_exactly_when_close() {
        assert_eq!(calc_gas_limit(30_000_000, 30_000_500), 30_000_500);
        assert_eq!(calc_gas_limit(30_000_000, 30_000_000), 30_000_000);
    }

    #[test]
    fn gas_limit_respects_floor() {
        // delta = 6000/1024 - 1 = 4, clamped no further than the floor
        assert_eq!(calc_gas_limit(6_000, 0), 5_996);
        // desired below the floor is clamped to the floor
        assert_eq!(calc_gas_limit(5_000, 0), 5_000);
    }

    fn london_parent(gas_limit: u64, gas_used: u64, base_fee: u128) -> Header {
        Header { gas_limit, gas_used, base_fee: Some(base_fee), ..Default::default() }
    }

    #[test]
    fn activation_block_gets_initial_base_fee() {
        let parent = Header { gas_limit: 30_000_000, ..Default::default() };
        assert_eq!(calc_base_fee(&parent, false, 8, 50), INITIAL_BASE_FEE);
    }

    #[test]
    fn base_fee_steady_at_target() {
        let parent = london_parent(30_000_000, 15_000_000, 1_000_000_000);
        assert_eq!(calc_base_fee(&parent, true, 8, 50), 1_000_000_000);
    }

    #[test]
    fn base_fee_rises_when_above_target() {
        // Full block at 50% target: delta = fee / 8.
        let parent = london_parent(30_000_000, 30_000_000, 1_000_000_000);
        assert_eq!(calc_base_fee(&parent, true, 8, 50), 1_125_000_000);
    }

    #[test]
    fn base_fee_falls_when_below_target() {
        // Empty block: delta = fee / 8.
        let parent = london_parent(30_000_000, 0, 1_000_000_000);
        assert_eq!(calc_base_fee(&parent, true, 8, 50), 875_000_000);
    }

    #[test]
    fn change_rate_scales_the_step() {
        let parent = london_parent(30_000_000, 30_000_000, 1_000_000_000);
        // Denominator 4 doubles the step of denominator 8.
        assert_eq!(calc_base_fee(&parent, true, 4, 50), 1_250_000_000);
    }
}
