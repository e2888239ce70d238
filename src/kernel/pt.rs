// Stackless continuations
//
// A protothread body is an explicit state machine: each numbered step
// either falls through to the next one or suspends. The owning thread
// keeps only the resumption marker (the step index) between calls, and
// `resume` jumps straight back to the step that suspended. Anything the
// body needs after a suspension must live in its own fields; temporaries
// inside a step are gone once that step returns Wait/Yield/Hold.

use core::fmt;

use crate::kernel::clock::elapsed;
use crate::kernel::event::{Event, EventKind, EventPort, PushError};

/// Resumption marker. Only meaningful to the thread that owns it.
pub type Lc = u16;

/// Marker of a body that has not run yet (the entry step).
pub const START: Lc = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Waiting = 0,
    Yielded = 1,
    Exited = 2,
    Ended = 3,
}

impl Status {
    /// Ended and Exited threads are never invoked again until `init()`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Status::Exited | Status::Ended)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Waiting => write!(f, "Waiting"),
            Status::Yielded => write!(f, "Yielded"),
            Status::Exited => write!(f, "Exited"),
            Status::Ended => write!(f, "Ended"),
        }
    }
}

/// What a step asks the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fall through to the following step in this same invocation.
    Next,
    /// Continue at `point` in this same invocation (loops, branches).
    Goto(Lc),
    /// Suspend here; this step is re-run on the next invocation.
    Wait,
    /// Suspend once; the next invocation starts at the following step.
    Yield,
    /// Suspend here reporting `Yielded` (see [`Context::yield_until`]).
    Hold,
    /// Rewind to the entry step and report `Waiting`.
    Restart,
    /// Terminate immediately.
    Exit,
    /// The body ran out of steps.
    End,
}

impl Step {
    #[inline]
    pub const fn wait_until(cond: bool) -> Step {
        if cond { Step::Next } else { Step::Wait }
    }

    #[inline]
    pub const fn wait_while(cond: bool) -> Step {
        Self::wait_until(!cond)
    }
}

// protothread control block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pt {
    lc: Lc,
    // suspended at `lc` by Wait/Hold, so the next call re-enters that step
    held: bool,
}

impl Pt {
    pub const fn new() -> Self {
        Self {
            lc: START,
            held: false,
        }
    }

    pub fn init(&mut self) {
        self.lc = START;
        self.held = false;
    }

    pub const fn point(&self) -> Lc {
        self.lc
    }

    pub const fn is_started(&self) -> bool {
        self.lc != START
    }

    // Move to the following step. There is no step after `Lc::MAX`.
    fn advance(&mut self) -> bool {
        self.held = false;
        match self.lc.checked_add(1) {
            Some(next) => {
                self.lc = next;
                true
            }
            None => false,
        }
    }
}

/// A thread body.
///
/// `step` is called with the current resumption point and must return
/// without looping unboundedly: every path either reaches a suspending
/// step or terminates. Points the body does not know about should map to
/// [`Step::End`].
pub trait Protothread {
    fn step(&mut self, point: Lc, cx: &mut Context<'_>) -> Step;
}

/// Body built from a closure, see [`from_fn`].
pub struct FnBody<F>(F);

/// Wraps a closure `(point, cx) -> Step` as a [`Protothread`].
pub fn from_fn<F>(f: F) -> FnBody<F>
where
    F: FnMut(Lc, &mut Context<'_>) -> Step,
{
    FnBody(f)
}

impl<F> Protothread for FnBody<F>
where
    F: FnMut(Lc, &mut Context<'_>) -> Step,
{
    fn step(&mut self, point: Lc, cx: &mut Context<'_>) -> Step {
        (self.0)(point, cx)
    }
}

/// Per-invocation view handed to a body: the dispatch timestamp and the
/// event queue bound to the thread, if any.
pub struct Context<'a> {
    now: u32,
    events: Option<&'a dyn EventPort>,
    resumed: bool,
}

impl<'a> Context<'a> {
    pub fn new(now: u32, events: Option<&'a dyn EventPort>) -> Self {
        Self {
            now,
            events,
            resumed: false,
        }
    }

    #[inline]
    pub fn now(&self) -> u32 {
        self.now
    }

    #[inline]
    pub fn elapsed_since(&self, since: u32) -> u32 {
        elapsed(since, self.now)
    }

    /// True while re-running a step that suspended with Wait or Hold on the
    /// previous invocation, false once execution has moved on.
    #[inline]
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn events(&self) -> Option<&'a dyn EventPort> {
        self.events
    }

    pub fn pop_event(&self) -> Option<Event> {
        self.events.and_then(|q| q.pop())
    }

    /// Push an event stamped with the dispatch time onto the bound queue.
    pub fn post(&self, kind: EventKind, data: u32) -> Result<(), PushError> {
        let event = Event::new(kind, data, self.now);
        match self.events {
            Some(q) => q.push(event),
            None => Err(PushError::Unbound(event)),
        }
    }

    /// Suspend until an event is available, then store it in `slot`.
    pub fn wait_event(&self, slot: &mut Option<Event>) -> Step {
        match self.pop_event() {
            Some(ev) => {
                *slot = Some(ev);
                Step::Next
            }
            None => Step::Wait,
        }
    }

    /// Suspend until an event of `kind` arrives. Events of other kinds
    /// popped while searching are consumed and discarded.
    pub fn wait_event_kind(&self, kind: EventKind, slot: &mut Option<Event>) -> Step {
        while let Some(ev) = self.pop_event() {
            if ev.kind() == kind {
                *slot = Some(ev);
                return Step::Next;
            }
        }
        Step::Wait
    }

    /// Yield at least once, then stay suspended until `cond` holds.
    pub fn yield_until(&self, cond: bool) -> Step {
        if self.resumed && cond {
            Step::Next
        } else {
            Step::Hold
        }
    }
}

/// Run `body` from the point recorded in `pt` until it suspends or
/// terminates. This is the single entry dispatch of every thread.
pub fn resume<B>(pt: &mut Pt, body: &mut B, cx: &mut Context<'_>) -> Status
where
    B: Protothread + ?Sized,
{
    cx.resumed = pt.held;
    loop {
        match body.step(pt.lc, cx) {
            Step::Next => {
                if !pt.advance() {
                    pt.init();
                    return Status::Ended;
                }
                cx.resumed = false;
            }
            Step::Goto(point) => {
                pt.lc = point;
                pt.held = false;
                cx.resumed = false;
            }
            Step::Wait => {
                pt.held = true;
                return Status::Waiting;
            }
            Step::Hold => {
                pt.held = true;
                return Status::Yielded;
            }
            Step::Yield => {
                if !pt.advance() {
                    pt.init();
                    return Status::Ended;
                }
                return Status::Yielded;
            }
            Step::Restart => {
                pt.init();
                return Status::Waiting;
            }
            Step::Exit => return Status::Exited,
            Step::End => {
                pt.init();
                return Status::Ended;
            }
        }
    }
}
