// Round-robin protothread scheduler
// NOTE: No dynamic allocation, no priorities, no preemption. Threads run
// strictly in registration order and a body that never suspends starves
// everyone registered after it.
//
// All methods take `&self` so thread bodies may hold a reference to the
// scheduler and add, remove or stop during a pass; the pass cursor is
// adjusted on removal so nobody is skipped or run twice.

use core::cell::Cell;
use core::fmt;

use log::{debug, info, warn};

use crate::kernel::clock::Clock;
use crate::kernel::event::{Event, EventKind, EventPort, EventSender, PushError};
use crate::kernel::thread::{BindError, Task};

/// Default number of thread slots per scheduler.
pub const MAX_THREADS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddError {
    /// Every slot is taken
    Full,
    /// The same thread is already in the list
    AlreadyRegistered,
    /// The thread belongs to another scheduler's queue
    Bind(BindError),
}

impl fmt::Display for AddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddError::Full => write!(f, "thread table full"),
            AddError::AlreadyRegistered => write!(f, "thread already registered"),
            AddError::Bind(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for AddError {}

impl From<BindError> for AddError {
    fn from(e: BindError) -> Self {
        AddError::Bind(e)
    }
}

pub struct Scheduler<'a, const N: usize = MAX_THREADS> {
    threads: [Cell<Option<&'a dyn Task<'a>>>; N],
    len: Cell<usize>,
    // next slot to visit in the current pass
    cursor: Cell<usize>,
    in_pass: Cell<bool>,
    running: Cell<bool>,
    ticks: Cell<u32>,
    dropped_seen: Cell<u32>,
    events: &'a dyn EventPort,
    clock: &'a dyn Clock,
}

impl<'a, const N: usize> Scheduler<'a, N> {
    pub const fn new(events: &'a dyn EventPort, clock: &'a dyn Clock) -> Self {
        Self {
            threads: [const { Cell::new(None) }; N],
            len: Cell::new(0),
            cursor: Cell::new(0),
            in_pass: Cell::new(false),
            running: Cell::new(false),
            ticks: Cell::new(0),
            dropped_seen: Cell::new(0),
            events,
            clock,
        }
    }

    /// Append `thread` to the dispatch order and bind this scheduler's
    /// event queue into it.
    pub fn add_thread(&self, thread: &'a dyn Task<'a>) -> Result<(), AddError> {
        if self.contains(thread) {
            warn!("sched: {} already registered", thread.name());
            return Err(AddError::AlreadyRegistered);
        }
        let len = self.len.get();
        if len >= N {
            warn!("sched: table full, rejected {}", thread.name());
            return Err(AddError::Full);
        }
        thread.bind(self.events)?;

        self.threads[len].set(Some(thread));
        self.len.set(len + 1);
        debug!("sched: added {} at slot {}", thread.name(), len);
        Ok(())
    }

    /// Unregister `thread`, keeping the order of the others. Does not
    /// interrupt a body that is already running.
    pub fn remove_thread(&self, thread: &dyn Task<'a>) -> bool {
        match self.position(thread) {
            Some(idx) => {
                self.remove_at(idx);
                debug!("sched: removed {}", thread.name());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, thread: &dyn Task<'a>) -> bool {
        self.position(thread).is_some()
    }

    fn position(&self, thread: &dyn Task<'a>) -> Option<usize> {
        (0..self.len.get()).find(|&i| {
            self.threads[i]
                .get()
                .is_some_and(|t| core::ptr::addr_eq(t, thread))
        })
    }

    fn remove_at(&self, idx: usize) {
        let len = self.len.get();
        for j in idx..len - 1 {
            self.threads[j].set(self.threads[j + 1].get());
        }
        self.threads[len - 1].set(None);
        self.len.set(len - 1);

        let cursor = self.cursor.get();
        if idx < cursor {
            self.cursor.set(cursor - 1);
        }
    }

    /// One pass over the thread list in registration order. Threads that
    /// end or exit are retired immediately.
    pub fn run_once(&self) {
        if self.in_pass.replace(true) {
            debug!("sched: nested run_once ignored");
            return;
        }
        self.ticks.set(self.ticks.get().wrapping_add(1));

        let mut i = 0;
        while i < self.len.get() {
            self.cursor.set(i + 1);
            if let Some(thread) = self.threads[i].get() {
                if thread.is_active() {
                    let status = thread.execute(self.clock.now_us());
                    if status.is_terminal() {
                        debug!("sched: retired {} ({})", thread.name(), status);
                        self.remove_thread(thread);
                    }
                }
            }
            i = self.cursor.get();
        }

        self.in_pass.set(false);
        self.report_drops();
    }

    fn report_drops(&self) {
        let dropped = self.events.dropped();
        let seen = self.dropped_seen.replace(dropped);
        if dropped != seen {
            warn!("sched: event queue dropped {} events", dropped.wrapping_sub(seen));
        }
    }

    /// Drive passes until `stop()` or until no thread is registered. Has no
    /// effect when called from a thread body during a pass.
    pub fn run(&self) {
        if self.in_pass.get() {
            debug!("sched: run called from a thread body, ignored");
            return;
        }
        self.running.set(true);
        info!("sched: running {} threads", self.len.get());

        while self.running.get() && self.len.get() > 0 {
            self.run_once();
            core::hint::spin_loop();
        }

        self.running.set(false);
        info!("sched: stopped after {} ticks", self.ticks.get());
    }

    /// `run()` returns once the current pass completes.
    pub fn stop(&self) {
        self.running.set(false);
    }

    /// Stamp an event with the scheduler clock and queue it.
    pub fn post_event(&self, kind: EventKind, data: u32) -> Result<(), PushError> {
        self.events.push(Event::new(kind, data, self.clock.now_us()))
    }

    /// Producer handle for interrupt handlers bound to this scheduler's
    /// queue and clock.
    pub fn sender(&self) -> EventSender<'a> {
        EventSender::new(self.events, self.clock)
    }

    pub fn events(&self) -> &'a dyn EventPort {
        self.events
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    pub fn thread_count(&self) -> usize {
        self.len.get()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn ticks(&self) -> u32 {
        self.ticks.get()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Registered threads in dispatch order.
    pub fn threads(&self) -> impl Iterator<Item = &'a dyn Task<'a>> + '_ {
        (0..self.len.get()).filter_map(|i| self.threads[i].get())
    }
}

impl<const N: usize> fmt::Debug for Scheduler<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.len.get())
            .field("capacity", &N)
            .field("ticks", &self.ticks.get())
            .field("running", &self.running.get())
            .finish()
    }
}
