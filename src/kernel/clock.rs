// Time source for thread bodies and event stamps
//
// Time is a wrapping 32-bit microsecond counter. TickClock is advanced
// by a periodic timer interrupt; the per-tick weight lets the board slow
// the timer while idle without the uptime drifting. Compare timestamps
// only through `elapsed`, never with `<`.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

pub trait Clock: Sync {
    fn now_us(&self) -> u32;
}

/// Microseconds from `since` to `now`, correct across one wrap.
#[inline]
pub const fn elapsed(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

pub struct TickClock {
    // cs: targets without atomic add (riscv32imc, thumbv6m)
    now_us: Mutex<Cell<u32>>,
    us_per_tick: AtomicU32,
}

impl TickClock {
    pub const fn new(us_per_tick: u32) -> Self {
        Self {
            now_us: Mutex::new(Cell::new(0)),
            us_per_tick: AtomicU32::new(us_per_tick),
        }
    }

    /// Called from the timer interrupt.
    #[inline]
    pub fn tick(&self) {
        let weight = self.us_per_tick.load(Ordering::Relaxed);
        self.advance(weight);
    }

    pub fn advance(&self, us: u32) {
        critical_section::with(|cs| {
            let now = self.now_us.borrow(cs);
            now.set(now.get().wrapping_add(us));
        });
    }

    /// Change how much time one `tick()` accounts for, e.g. after the
    /// board reprograms the timer period.
    pub fn set_tick_period(&self, us_per_tick: u32) {
        self.us_per_tick.store(us_per_tick, Ordering::Release);
    }

    pub fn tick_period(&self) -> u32 {
        self.us_per_tick.load(Ordering::Acquire)
    }

    pub fn set_now(&self, us: u32) {
        critical_section::with(|cs| self.now_us.borrow(cs).set(us));
    }
}

impl Clock for TickClock {
    fn now_us(&self) -> u32 {
        critical_section::with(|cs| self.now_us.borrow(cs).get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate_with_weight() {
        let clock = TickClock::new(10_000);
        clock.tick();
        clock.tick();
        assert_eq!(clock.now_us(), 20_000);

        clock.set_tick_period(100_000);
        clock.tick();
        assert_eq!(clock.now_us(), 120_000);
        assert_eq!(clock.tick_period(), 100_000);
    }

    #[test]
    fn elapsed_survives_wrap() {
        let clock = TickClock::new(1);
        clock.set_now(u32::MAX - 4);
        let start = clock.now_us();
        clock.advance(10);
        assert_eq!(clock.now_us(), 5);
        assert_eq!(elapsed(start, clock.now_us()), 10);
    }
}
