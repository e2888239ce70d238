// Periodic gate for "run every N µs" steps
//
// Folds elapsed-time checks into wait conditions:
//
//     1 => Step::wait_until(self.blink.ready(cx.now())),
//
// There are no built-in timeouts; a bounded wait is written the same way,
// or-ing the real condition with an Interval/elapsed check.

use core::fmt;

use crate::kernel::clock::elapsed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period_us: u32,
    last: u32,
}

impl Interval {
    /// Period 0 means "always ready".
    pub const fn new(period_us: u32) -> Self {
        Self { period_us, last: 0 }
    }

    pub const fn from_millis(ms: u32) -> Self {
        Self::new(ms.saturating_mul(1000))
    }

    /// True once a full period has passed since the last time it fired;
    /// firing re-arms from `now`.
    pub fn ready(&mut self, now: u32) -> bool {
        if self.period_us == 0 {
            return true;
        }
        if elapsed(self.last, now) >= self.period_us {
            self.last = now;
            true
        } else {
            false
        }
    }

    /// Start a fresh period at `now`.
    pub fn reset(&mut self, now: u32) {
        self.last = now;
    }

    pub fn remaining(&self, now: u32) -> u32 {
        self.period_us.saturating_sub(elapsed(self.last, now))
    }

    pub fn set_period(&mut self, period_us: u32) {
        self.period_us = period_us;
    }

    pub const fn period(&self) -> u32 {
        self.period_us
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {}us", self.period_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let mut iv = Interval::from_millis(5);
        iv.reset(1_000);
        assert!(!iv.ready(5_999));
        assert_eq!(iv.remaining(5_999), 1);
        assert!(iv.ready(6_000));
        assert!(!iv.ready(6_001));
        assert!(iv.ready(11_000));
    }

    #[test]
    fn zero_period_always_ready() {
        let mut iv = Interval::new(0);
        assert!(iv.ready(0));
        assert!(iv.ready(0));
    }

    #[test]
    fn handles_counter_wrap() {
        let mut iv = Interval::new(100);
        iv.reset(u32::MAX - 49);
        assert!(!iv.ready(40));
        assert!(iv.ready(50));
    }
}
