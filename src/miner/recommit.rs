//! Adaptive resubmit interval for PoW sealing.
//!
//! Every aborted-for-resubmit commit feeds back how full the block
//! already was; the controller smooths that signal into a new resubmit
//! interval so busy chains resubmit less often and idle chains pick up
//! new transactions quickly.

use std::time::Duration;

/// Minimal time interval to recreate the sealing block with any newly
/// arrived transactions.
pub const MIN_RECOMMIT_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum time interval to recreate the sealing block with any newly
/// arrived transactions.
pub const MAX_RECOMMIT_INTERVAL: Duration = Duration::from_secs(15);

/// Impact a single interval adjustment has on the resubmit interval.
pub const INTERVAL_ADJUST_RATIO: f64 = 0.1;

/// Bias applied during interval adjustment so the limits stay
/// reachable, in nanoseconds.
pub const INTERVAL_ADJUST_BIAS: f64 = 200_000_000.0;

/// A resubmit-interval adjustment fed back by the committer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct IntervalAdjust {
    /// Fraction of the gas limit already used when interrupted.
    pub ratio: f64,
    /// Whether to increase (true) or decay toward the minimum.
    pub inc: bool,
}

/// Recalculate the resubmit interval from feedback.
///
/// Exponential smoothing toward `target` (nanoseconds) with ratio
/// [`INTERVAL_ADJUST_RATIO`] and bias [`INTERVAL_ADJUST_BIAS`],
/// clamped into `[min_recommit, MAX_RECOMMIT_INTERVAL]`.
pub fn recalc_recommit(min_recommit: Duration, prev: Duration, target: f64, inc: bool) -> Duration {
    let prev_ns = prev.as_nanos() as f64;
    let next = if inc {
        let next = prev_ns * (1.0 - INTERVAL_ADJUST_RATIO)
            + INTERVAL_ADJUST_RATIO * (target + INTERVAL_ADJUST_BIAS);
        next.min(MAX_RECOMMIT_INTERVAL.as_nanos() as f64)
    } else {
        let next = prev_ns * (1.0 - INTERVAL_ADJUST_RATIO)
            + INTERVAL_ADJUST_RATIO * (target - INTERVAL_ADJUST_BIAS);
        next.max(min_recommit.as_nanos() as f64)
    };
    Duration::from_nanos(next as u64)
}

/// Holds the user floor and the current resubmit interval.
pub(crate) struct ResubmitController {
    min_recommit: Duration,
    recommit: Duration,
}

impl ResubmitController {
    /// Start from the user-provided interval; it is both the floor and
    /// the initial value.
    pub fn new(recommit: Duration) -> Self {
        Self { min_recommit: recommit, recommit }
    }

    /// Current resubmit interval.
    pub fn recommit(&self) -> Duration {
        self.recommit
    }

    /// Current floor.
    pub fn min_recommit(&self) -> Duration {
        self.min_recommit
    }

    /// Apply committer feedback.
    pub fn adjust(&mut self, adjust: IntervalAdjust) {
        if adjust.inc {
            let target = self.recommit.as_nanos() as f64 / adjust.ratio;
            self.recommit = recalc_recommit(self.min_recommit, self.recommit, target, true);
        } else {
            let target = self.min_recommit.as_nanos() as f64;
            self.recommit = recalc_recommit(self.min_recommit, self.recommit, target, false);
        }
    }

    /// Replace both bounds from an explicit user update, clamped to the
    /// global minimum. Returns the sanitized interval.
    pub fn update_interval(&mut self, interval: Duration) -> Duration {
        let interval = interval.max(MIN_RECOMMIT_INTERVAL);
        self.min_recommit = interval;
        self.recommit = interval;
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increase_feedback_arithmetic() {
        // prev = 3 s, ratio = 0.2 -> target = 15 s;
        // next = 3e9 * 0.9 + 0.1 * (15e9 + 2e8) = 4.22 s.
        let mut controller = ResubmitController::new(Duration::from_secs(3));
        controller.min_recommit = Duration::from_secs(1);
        controller.adjust(IntervalAdjust { ratio: 0.2, inc: true });
        assert_eq!(controller.recommit(), Duration::from_nanos(4_220_000_000));
        assert!(controller.recommit() <= MAX_RECOMMIT_INTERVAL);
    }

    #[test]
    fn increase_clamps_at_maximum() {
        let next = recalc_recommit(
            Duration::from_secs(1),
            Duration::from_secs(14),
            1_000.0e9,
            true,
        );
        assert_eq!(next, MAX_RECOMMIT_INTERVAL);
    }

    #[test]
    fn decrease_converges_to_floor() {
        let mut controller = ResubmitController::new(Duration::from_secs(1));
        controller.recommit = Duration::from_secs(10);
        for _ in 0..200 {
            controller.adjust(IntervalAdjust { ratio: 0.0, inc: false });
        }
        assert_eq!(controller.recommit(), controller.min_recommit());
    }

    #[test]
    fn recalc_is_monotone_in_prev() {
        let min = Duration::from_secs(1);
        let a = recalc_recommit(min, Duration::from_secs(2), 5.0e9, true);
        let b = recalc_recommit(min, Duration::from_secs(4), 5.0e9, true);
        assert!(a < b);
    }

    #[test]
    fn explicit_update_is_sanitized() {
        let mut controller = ResubmitController::new(Duration::from_secs(3));
        let applied = controller.update_interval(Duration::from_millis(10));
        assert_eq!(applied, MIN_RECOMMIT_INTERVAL);
        assert_eq!(controller.min_recommit(), MIN_RECOMMIT_INTERVAL);
        assert_eq!(controller.recommit(), MIN_RECOMMIT_INTERVAL);

        let applied = controller.update_interval(Duration::from_secs(5));
        assert_eq!(applied, Duration::from_secs(5));
    }
}
