// Counting semaphore for protothreads
//
// `wait` is a step: it suspends the calling thread while the count is
// zero and takes one unit once available. `signal` may be called from
// interrupt context.

use core::cell::Cell;

use critical_section::Mutex;

use crate::kernel::pt::Step;

pub struct Semaphore {
    count: Mutex<Cell<u32>>,
}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Self {
            count: Mutex::new(Cell::new(count)),
        }
    }

    pub fn signal(&self) {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            count.set(count.get().saturating_add(1));
        });
    }

    pub fn try_acquire(&self) -> bool {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            match count.get() {
                0 => false,
                n => {
                    count.set(n - 1);
                    true
                }
            }
        })
    }

    #[inline]
    pub fn wait(&self) -> Step {
        if self.try_acquire() { Step::Next } else { Step::Wait }
    }

    pub fn count(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    pub fn reset(&self, count: u32) {
        critical_section::with(|cs| self.count.borrow(cs).set(count));
    }
}
