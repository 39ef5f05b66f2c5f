//! Block-cadence pacing for leader mode.
//!
//! Leader mode has no difficulty to pace block production, so the
//! worker paces itself: before each build it compares the wall clock
//! against ancestor timestamps at increasing look-back distances and
//! classifies the chain as behind, ahead or on schedule. The verdict
//! sets the build deadline (`till`) — build fast when behind, stretch
//! a full interval when ahead — so the observed block rate converges
//! to the configured interval.

use super::config::MinerConfig;
use crate::chain::Blockchain;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Never peek further back than this many blocks.
const MAX_PEEK_BACK: i64 = 86_400;

/// A probe older than this multiple of the expected span is ignored;
/// the chain was simply down, not slow.
const TOO_BEHIND_MULTIPLE: i64 = 2;

/// Look-back offsets for ancestor timing probes.
const ANCESTOR_OFFSETS: [i64; 6] = [1, 10, 50, 100, 500, 1000];

/// Current unix time in seconds.
pub(crate) fn unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Current unix time in milliseconds.
pub(crate) fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Classify one timing probe.
///
/// `dt` is the age of the block `height_to_peek` blocks back. Behind
/// (`-1`) when the span exceeds the expected one but is still within
/// [`TOO_BEHIND_MULTIPLE`] of it; ahead (`+1`) when the span is
/// shorter than expected; on schedule (`0`) otherwise.
pub(crate) fn offset_for(dt: i64, height_to_peek: i64, interval_secs: i64) -> i8 {
    let expected = height_to_peek * interval_secs;
    if expected < dt && dt < TOO_BEHIND_MULTIPLE * expected {
        -1
    } else if dt < expected {
        1
    } else {
        0
    }
}

/// Pick the next block's timestamp and wall-clock build deadline.
///
/// Returns `(timestamp_secs, till_unix_ms)`.
pub(crate) fn time_it(
    chain: &dyn Blockchain,
    block_interval_ms: u64,
    config: &MinerConfig,
) -> (u64, i64) {
    let mut interval = (block_interval_ms / 1000) as i64;
    if interval <= 0 {
        interval = 1;
    }

    let parent = chain.current_block();
    let next_number = parent.number() as i64 + 1;
    let now_s = unix_secs();
    let now_ms = unix_ms();

    let check = |height_to_peek: i64| -> (i8, i64) {
        let h = height_to_peek.min(MAX_PEEK_BACK);
        let n = next_number - h;
        if n < 0 {
            return (0, 0);
        }
        let Some(header) = chain.header_by_number(n as u64) else {
            return (0, 0);
        };
        let dt = now_s - header.time as i64;
        (offset_for(dt, h, interval), dt)
    };

    let mut ahead = 0;
    let (mut offset, dt) = check(1);
    debug!(target: "miner::pacing", round = 1, offset, dt, "timing probe");
    if offset >= 0 {
        if offset > 0 {
            ahead += 1;
        }
        let mut adj_blocks = config.block_time_adj_blocks;
        for _ in 0..config.block_time_adj_multiple {
            let (o, dt) = check(adj_blocks);
            debug!(target: "miner::pacing", round = adj_blocks, offset = o, dt, "timing probe");
            offset = o;
            if offset < 0 {
                break;
            } else if offset > 0 {
                ahead += 1;
            }
            adj_blocks *= 10;
        }
    }
    if offset >= 0 && ahead > 0 {
        offset = 1;
    }

    let mut timestamp = now_s as u64;
    // Parity quirk carried over from the original: a unix timestamp is
    // clamped against the parent block *number*.
    if timestamp < parent.number() {
        timestamp = parent.number();
    }

    let min_build = config.block_min_build_time_ms;
    let trail = config.block_trail_time_ms;
    let till = match offset {
        -1 => {
            // Behind: too few blocks so far, build quickly.
            let mut tms = now_ms + min_build;
            if tms / 1000 <= parent.time() as i64 {
                // No more than two blocks may share a second.
                tms = (now_s + 1) * 1000;
            }
            debug!(target: "miner::pacing", timestamp, duration = tms - now_ms, "behind");
            tms
        }
        1 => {
            // Ahead: too many blocks, stretch a full interval.
            let mut tms = now_ms + interval * 1000 + min_build;
            if tms / 1000 > now_s + interval {
                // The timestamp must not jump by interval + 2.
                tms = (now_s + interval + 1) * 1000 - trail;
            }
            debug!(target: "miner::pacing", timestamp, duration = tms - now_ms, "ahead");
            tms
        }
        _ => {
            // On schedule.
            let mut tms = now_ms + interval * 1000 - trail;
            if tms / 1000 > now_s + 1 {
                // The timestamp must not jump by two.
                tms = (now_s + 2) * 1000 - trail;
            }
            debug!(target: "miner::pacing", timestamp, duration = tms - now_ms, "on schedule");
            tms
        }
    };
    (timestamp, till)
}

/// Collect ancestor block times at the six standard look-back offsets
/// behind `number`. A slot is zero when the ancestor does not exist.
pub fn ancestor_times(chain: &dyn Blockchain, number: u64) -> [i64; 6] {
    let mut times = [0i64; 6];
    for (slot, offset) in ANCESTOR_OFFSETS.iter().enumerate() {
        let bn = number as i64 - offset;
        if bn <= 0 {
            continue;
        }
        if let Some(header) = chain.header_by_number(bn as u64) {
            times[slot] = header.time as i64;
        }
    }
    times
}

/// Throttle verdict from ancestor times: seconds to hold off producing
/// (zero when production may proceed) and the age of the parent.
///
/// The thresholds allow, per look-back distance: 1000 blocks in 2000 s,
/// 500 in 500 s, 100 in 50 s, 50 in 10 s.
pub fn throttle_delay(times: &[i64; 6], now: i64) -> (i64, i64) {
    let parent_age = now - times[0];
    let mut dt;
    dt = now - times[5];
    if times[5] > 0 && dt < 2000 {
        return (2000 - dt, parent_age);
    }
    dt = now - times[4];
    if times[4] > 0 && dt < 500 {
        return (500 - dt, parent_age);
    }
    dt = now - times[3];
    if times[3] > 0 && dt < 50 {
        return (50 - dt, parent_age);
    }
    dt = now - times[2];
    if times[2] > 0 && dt < 10 {
        return (10 - dt, parent_age);
    }
    (0, parent_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainConfig, InMemoryChain};
    use crate::primitives::{Block, Header};
    use crate::state::InMemoryState;
    use alloy_primitives::Address;

    fn chain_with_parent(number: u64, time: u64) -> InMemoryChain {
        let base = Block::new(
            Header { number, time, gas_limit: 30_000_000, ..Default::default() },
            vec![],
            vec![],
            &[],
        );
        InMemoryChain::new(ChainConfig::all_active(1), base, Box::new(InMemoryState::new()))
    }

    fn config() -> MinerConfig {
        MinerConfig::new(Address::repeat_byte(0xaa))
    }

    #[test]
    fn probe_behind_at_distance_fifty() {
        // 75 intervals elapsed where 50 were expected, still under the
        // too-behind multiple: the chain is behind.
        let interval = 1;
        assert_eq!(offset_for(75 * interval, 50, interval), -1);
    }

    #[test]
    fn probe_ahead_when_span_short() {
        assert_eq!(offset_for(30, 50, 1), 1);
    }

    #[test]
    fn probe_ignores_long_outages() {
        // Twice the expected span or more: not "behind", just down.
        assert_eq!(offset_for(100, 50, 1), 0);
        assert_eq!(offset_for(500, 50, 1), 0);
    }

    #[test]
    fn probe_exact_span_is_on_schedule() {
        assert_eq!(offset_for(50, 50, 1), 0);
    }

    #[test]
    fn behind_deadline_is_min_build_time() {
        // Parent 7 s old with a 5 s interval: 5 < 7 < 10, behind.
        let now = unix_secs();
        let chain = chain_with_parent(100, (now - 7) as u64);
        let config = config();

        let (timestamp, till) = time_it(&chain, 5_000, &config);

        assert_eq!(timestamp, now as u64);
        let now_ms = unix_ms();
        assert!(till <= now_ms + config.block_min_build_time_ms);
        assert!(till > now_ms - 1_000 + config.block_min_build_time_ms);
        // The deadline always lands past the parent's second.
        assert!(till > (now - 7) * 1000);
    }

    #[test]
    fn ahead_deadline_stretches_an_interval() {
        // Parent fresh: dt = 0 < interval, ahead.
        let now = unix_secs();
        let chain = chain_with_parent(100, now as u64);
        let config = config();

        let (_, till) = time_it(&chain, 5_000, &config);

        let now_ms = unix_ms();
        assert!(till >= now_ms - 100 + 5_000);
        assert!(till <= (now + 6) * 1000);
    }

    #[test]
    fn timestamp_clamps_to_parent_number() {
        // The preserved quirk: a parent *number* beyond the wall clock
        // drags the timestamp up to it.
        let number = 4_000_000_000u64;
        let chain = chain_with_parent(number, unix_secs() as u64);
        let (timestamp, _) = time_it(&chain, 1_000, &config());
        assert_eq!(timestamp, number);
    }

    #[test]
    fn ancestor_times_fill_known_slots() {
        let now = unix_secs() as u64;
        let chain = chain_with_parent(100, now);
        // Only offset 1 (block 100) and offsets 10, 50, 100 (missing)
        // are in range; missing ancestors stay zero.
        let times = ancestor_times(&chain, 101);
        assert_eq!(times[0], now as i64);
        assert_eq!(times[1], 0);
        assert_eq!(times[5], 0);
    }

    #[test]
    fn throttle_thresholds() {
        let now = 10_000i64;
        // 1000-block probe only 1500 s old: hold off 500 s.
        let mut times = [now - 1, 0, 0, 0, 0, now - 1500];
        assert_eq!(throttle_delay(&times, now), (500, 1));

        // All probes comfortably old: no throttle.
        times = [now - 5, now - 100, now - 1000, now - 2000, now - 3000, now - 5000];
        assert_eq!(throttle_delay(&times, now), (0, 5));
    }
}
