// Named protothread wrapper
//
// A Thread owns one continuation plus its diagnostics and is shared by
// reference: the code that created it, the scheduler it is registered
// with, and other thread bodies (to stop or restart it) all hold `&Thread`.
// State lives in Cells so none of those references need `&mut`.

use core::cell::{Cell, OnceCell, RefCell};
use core::fmt;

use log::debug;

use crate::kernel::event::EventPort;
use crate::kernel::pt::{self, Context, Lc, Protothread, Pt, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    /// Thread already posts to and reads from a different queue
    AlreadyBound,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::AlreadyBound => write!(f, "thread already bound to another event queue"),
        }
    }
}

impl core::error::Error for BindError {}

/// What the scheduler needs from a registered thread, independent of the
/// body type.
pub trait Task<'a> {
    fn name(&self) -> &'static str;
    fn is_active(&self) -> bool;
    fn execute(&self, now: u32) -> Status;
    fn stop(&self);
    fn bind(&self, events: &'a dyn EventPort) -> Result<(), BindError>;
}

pub struct Thread<'a, B> {
    name: &'static str,
    pt: Cell<Pt>,
    active: Cell<bool>,
    terminal: Cell<Option<Status>>,
    run_count: Cell<u32>,
    last_run_time: Cell<u32>,
    events: OnceCell<&'a dyn EventPort>,
    body: RefCell<B>,
}

impl<'a, B: Protothread> Thread<'a, B> {
    /// A new thread is active and starts from the top of its body.
    pub const fn new(name: &'static str, body: B) -> Self {
        Self {
            name,
            pt: Cell::new(Pt::new()),
            active: Cell::new(true),
            terminal: Cell::new(None),
            run_count: Cell::new(0),
            last_run_time: Cell::new(0),
            events: OnceCell::new(),
            body: RefCell::new(body),
        }
    }

    /// Run the body once from its resumption point.
    ///
    /// An inactive thread returns its terminal status (`Exited` if it was
    /// stopped before finishing) and does nothing else.
    pub fn execute(&self, now: u32) -> Status {
        if !self.active.get() {
            return self.terminal.get().unwrap_or(Status::Exited);
        }
        let Ok(mut body) = self.body.try_borrow_mut() else {
            debug!("thread {}: nested execute ignored", self.name);
            return Status::Waiting;
        };

        self.last_run_time.set(now);
        let mut pt = self.pt.get();
        let mut cx = Context::new(now, self.events.get().copied());
        let status = pt::resume(&mut pt, &mut *body, &mut cx);
        self.pt.set(pt);
        self.run_count.set(self.run_count.get().wrapping_add(1));

        if status.is_terminal() {
            self.active.set(false);
            self.terminal.set(Some(status));
        }
        status
    }

    /// Rewind to the top of the body and reactivate. Body fields are left
    /// as they are; reset them in the entry step if needed.
    pub fn init(&self) {
        self.pt.set(Pt::new());
        self.active.set(true);
        self.terminal.set(None);
        self.run_count.set(0);
    }

    /// Prevent future invocations. Marker and counters are kept.
    pub fn stop(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run_count(&self) -> u32 {
        self.run_count.get()
    }

    pub fn last_run_time(&self) -> u32 {
        self.last_run_time.get()
    }

    pub fn point(&self) -> Lc {
        self.pt.get().point()
    }

    pub fn is_bound(&self) -> bool {
        self.events.get().is_some()
    }

    /// Bind the event queue this thread reads from. Binding is permanent;
    /// binding the same queue again is accepted.
    pub fn bind(&self, events: &'a dyn EventPort) -> Result<(), BindError> {
        match self.events.get() {
            Some(bound) if core::ptr::addr_eq(*bound, events) => Ok(()),
            Some(_) => Err(BindError::AlreadyBound),
            None => {
                let _ = self.events.set(events);
                Ok(())
            }
        }
    }

    /// Inspect the body. `None` while the body is running.
    pub fn with_body<R>(&self, f: impl FnOnce(&B) -> R) -> Option<R> {
        self.body.try_borrow().ok().map(|b| f(&b))
    }

    pub fn with_body_mut<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        self.body.try_borrow_mut().ok().map(|mut b| f(&mut b))
    }
}

impl<'a, B: Protothread> Task<'a> for Thread<'a, B> {
    fn name(&self) -> &'static str {
        Thread::name(self)
    }

    fn is_active(&self) -> bool {
        Thread::is_active(self)
    }

    fn execute(&self, now: u32) -> Status {
        Thread::execute(self, now)
    }

    fn stop(&self) {
        Thread::stop(self)
    }

    fn bind(&self, events: &'a dyn EventPort) -> Result<(), BindError> {
        Thread::bind(self, events)
    }
}

impl<B> fmt::Debug for Thread<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("point", &self.pt.get().point())
            .field("active", &self.active.get())
            .field("run_count", &self.run_count.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::event::{EventKind, EventQueue};
    use crate::kernel::pt::{Step, from_fn};

    #[test]
    fn terminal_status_clears_active() {
        let t = Thread::new("once", from_fn(|_, _| Step::Exit));
        assert!(t.is_active());
        assert_eq!(t.execute(10), Status::Exited);
        assert!(!t.is_active());
        assert_eq!(t.run_count(), 1);
        assert_eq!(t.last_run_time(), 10);

        // no side effects once inactive
        assert_eq!(t.execute(20), Status::Exited);
        assert_eq!(t.run_count(), 1);
        assert_eq!(t.last_run_time(), 10);
    }

    #[test]
    fn ended_thread_reports_ended_until_init() {
        let t = Thread::new("end", from_fn(|_, _| Step::End));
        assert_eq!(t.execute(0), Status::Ended);
        assert_eq!(t.execute(1), Status::Ended);
        t.init();
        assert!(t.is_active());
        assert_eq!(t.run_count(), 0);
        assert_eq!(t.execute(2), Status::Ended);
        assert_eq!(t.run_count(), 1);
    }

    #[test]
    fn stop_keeps_marker_and_counters() {
        let t = Thread::new("loop", from_fn(|point, _| match point {
            0 => Step::Yield,
            _ => Step::Wait,
        }));
        assert_eq!(t.execute(0), Status::Yielded);
        assert_eq!(t.execute(1), Status::Waiting);
        t.stop();
        assert!(!t.is_active());
        assert_eq!(t.point(), 1);
        assert_eq!(t.run_count(), 2);
        assert_eq!(t.execute(2), Status::Exited);
        assert_eq!(t.run_count(), 2);
    }

    #[test]
    fn binding_is_one_shot() {
        let a: EventQueue<4> = EventQueue::new();
        let b: EventQueue<4> = EventQueue::new();
        let t = Thread::new("bound", from_fn(|_, _| Step::Wait));
        assert!(!t.is_bound());
        t.bind(&a).unwrap();
        t.bind(&a).unwrap();
        assert_eq!(t.bind(&b), Err(BindError::AlreadyBound));
        assert!(t.is_bound());
    }

    #[test]
    fn bound_queue_reaches_the_body() {
        let q: EventQueue<4> = EventQueue::new();
        let t = Thread::new("echo", from_fn(|point, cx| match point {
            0 => {
                let _ = cx.post(EventKind::SequenceStep, 9);
                Step::Yield
            }
            _ => Step::Exit,
        }));
        t.bind(&q).unwrap();
        assert_eq!(t.execute(77), Status::Yielded);
        let ev = q.pop().unwrap();
        assert_eq!((ev.kind(), ev.data(), ev.timestamp()), (EventKind::SequenceStep, 9, 77));
    }

    #[test]
    fn body_is_inspectable_between_runs() {
        struct Counter(u32);
        impl Protothread for Counter {
            fn step(&mut self, _point: Lc, _cx: &mut Context<'_>) -> Step {
                self.0 += 1;
                Step::Yield
            }
        }
        let t = Thread::new("count", Counter(0));
        t.execute(0);
        t.execute(1);
        assert_eq!(t.with_body(|c| c.0), Some(2));
        t.with_body_mut(|c| c.0 = 10);
        assert_eq!(t.with_body(|c| c.0), Some(10));
    }
}
