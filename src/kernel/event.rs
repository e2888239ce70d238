// Timestamped events and the queue that carries them out of interrupts
//
// Producers (GPIO/timer interrupts, other threads) push; the cooperative
// loop pops. The ring's head/tail/len only change inside a critical
// section, and the work done there is O(1) with no waiting, so an
// interrupt is never held off for more than a handful of instructions.
// Overflow rejects the newest event; `push_overwrite` evicts the oldest
// instead for producers that prefer fresh data.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;

use crate::kernel::clock::Clock;

/// Default number of buffered events per queue.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TimerTick,
    EncoderTurn,
    ButtonPress,
    ButtonRelease,
    GateRising,
    GateFalling,
    AdcReady,
    ScreenRefresh,
    SequenceStep,
    CvChange,
    User,
}

impl EventKind {
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::TimerTick => "TimerTick",
            EventKind::EncoderTurn => "EncoderTurn",
            EventKind::ButtonPress => "ButtonPress",
            EventKind::ButtonRelease => "ButtonRelease",
            EventKind::GateRising => "GateRising",
            EventKind::GateFalling => "GateFalling",
            EventKind::AdcReady => "AdcReady",
            EventKind::ScreenRefresh => "ScreenRefresh",
            EventKind::SequenceStep => "SequenceStep",
            EventKind::CvChange => "CvChange",
            EventKind::User => "User",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable message: what happened, a 32-bit payload whose meaning
/// belongs to the producer, and when (µs, wrapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    data: u32,
    timestamp: u32,
}

impl Event {
    pub const fn new(kind: EventKind, data: u32, timestamp: u32) -> Self {
        Self {
            kind,
            data,
            timestamp,
        }
    }

    #[inline]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    pub const fn data(&self) -> u32 {
        self.data
    }

    #[inline]
    pub const fn timestamp(&self) -> u32 {
        self.timestamp
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) @{}us", self.kind, self.data, self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Queue is at capacity, contains the rejected event
    Full(Event),
    /// Posting thread has no queue bound yet
    Unbound(Event),
}

impl PushError {
    pub const fn into_event(self) -> Event {
        match self {
            PushError::Full(ev) | PushError::Unbound(ev) => ev,
        }
    }
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(ev) => write!(f, "event queue full, rejected {}", ev),
            PushError::Unbound(ev) => write!(f, "no event queue bound, rejected {}", ev),
        }
    }
}

impl core::error::Error for PushError {}

/// Capacity-erased access to an event queue, so threads and senders can
/// hold a plain reference regardless of the queue's size.
pub trait EventPort: Sync {
    fn push(&self, event: Event) -> Result<(), PushError>;
    fn push_overwrite(&self, event: Event) -> Option<Event>;
    fn pop(&self) -> Option<Event>;
    fn peek(&self) -> Option<Event>;
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;
    fn dropped(&self) -> u32;
    fn clear(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ring buffer for events
struct Ring<const N: usize> {
    buf: [Option<Event>; N],
    head: usize, // next to read
    tail: usize, // next to write
    len: usize,
    dropped: u32,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        Self {
            buf: [None; N],
            head: 0,
            tail: 0,
            len: 0,
            dropped: 0,
        }
    }

    fn push(&mut self, event: Event) -> Result<(), Event> {
        if self.len >= N {
            self.dropped = self.dropped.wrapping_add(1);
            return Err(event);
        }
        self.buf[self.tail] = Some(event);
        self.tail = (self.tail + 1) % N;
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }
        let event = self.buf[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        event
    }

    fn peek(&self) -> Option<Event> {
        if self.len == 0 {
            None
        } else {
            self.buf[self.head]
        }
    }

    fn clear(&mut self) {
        self.buf = [None; N];
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}

pub struct EventQueue<const N: usize = EVENT_QUEUE_CAPACITY> {
    ring: Mutex<RefCell<Ring<N>>>,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
        }
    }

    /// Append `event`; on a full queue the event is handed back and the
    /// buffer is left untouched.
    pub fn push(&self, event: Event) -> Result<(), PushError> {
        critical_section::with(|cs| self.ring.borrow_ref_mut(cs).push(event))
            .map_err(PushError::Full)
    }

    /// Append `event`, evicting the oldest one if the queue is full.
    /// Returns the evicted event.
    pub fn push_overwrite(&self, event: Event) -> Option<Event> {
        critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            if N == 0 {
                ring.dropped = ring.dropped.wrapping_add(1);
                return Some(event);
            }
            let evicted = if ring.len >= N {
                ring.dropped = ring.dropped.wrapping_add(1);
                ring.pop()
            } else {
                None
            };
            let _ = ring.push(event);
            evicted
        })
    }

    pub fn pop(&self) -> Option<Event> {
        critical_section::with(|cs| self.ring.borrow_ref_mut(cs).pop())
    }

    pub fn peek(&self) -> Option<Event> {
        critical_section::with(|cs| self.ring.borrow_ref(cs).peek())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Events rejected (or evicted) because the queue was full, since
    /// creation. Wraps.
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.ring.borrow_ref(cs).dropped)
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.ring.borrow_ref_mut(cs).clear());
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventPort for EventQueue<N> {
    fn push(&self, event: Event) -> Result<(), PushError> {
        EventQueue::push(self, event)
    }

    fn push_overwrite(&self, event: Event) -> Option<Event> {
        EventQueue::push_overwrite(self, event)
    }

    fn pop(&self) -> Option<Event> {
        EventQueue::pop(self)
    }

    fn peek(&self) -> Option<Event> {
        EventQueue::peek(self)
    }

    fn len(&self) -> usize {
        EventQueue::len(self)
    }

    fn capacity(&self) -> usize {
        N
    }

    fn dropped(&self) -> u32 {
        EventQueue::dropped(self)
    }

    fn clear(&self) {
        EventQueue::clear(self)
    }
}

/// Handle given to interrupt-context producers at construction: the
/// exact queue to post to and the clock used to stamp events.
#[derive(Clone, Copy)]
pub struct EventSender<'a> {
    port: &'a dyn EventPort,
    clock: &'a dyn Clock,
}

impl<'a> EventSender<'a> {
    pub const fn new(port: &'a dyn EventPort, clock: &'a dyn Clock) -> Self {
        Self { port, clock }
    }

    /// Stamp and push. Never blocks; a full queue drops the event.
    #[inline]
    pub fn post(&self, kind: EventKind, data: u32) -> Result<(), PushError> {
        self.port.push(Event::new(kind, data, self.clock.now_us()))
    }

    pub fn port(&self) -> &'a dyn EventPort {
        self.port
    }
}

impl fmt::Debug for EventSender<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("len", &self.port.len())
            .field("capacity", &self.port.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::clock::TickClock;

    fn ev(data: u32) -> Event {
        Event::new(EventKind::User, data, data * 10)
    }

    #[test]
    fn fifo_order() {
        let q: EventQueue<4> = EventQueue::new();
        for d in [1, 2, 3] {
            q.push(ev(d)).unwrap();
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(ev(1)));
        assert_eq!(q.pop(), Some(ev(2)));
        assert_eq!(q.pop(), Some(ev(3)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn full_queue_rejects_newest() {
        let q: EventQueue<2> = EventQueue::new();
        q.push(ev(1)).unwrap();
        q.push(ev(2)).unwrap();
        assert!(q.is_full());
        assert_eq!(q.push(ev(3)), Err(PushError::Full(ev(3))));
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop(), Some(ev(1)));
        assert_eq!(q.pop(), Some(ev(2)));
    }

    #[test]
    fn wraps_around_the_buffer() {
        let q: EventQueue<3> = EventQueue::new();
        for round in 0..5 {
            q.push(ev(round)).unwrap();
            q.push(ev(round + 100)).unwrap();
            assert_eq!(q.pop(), Some(ev(round)));
            assert_eq!(q.pop(), Some(ev(round + 100)));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn overwrite_evicts_oldest() {
        let q: EventQueue<2> = EventQueue::new();
        assert_eq!(q.push_overwrite(ev(1)), None);
        assert_eq!(q.push_overwrite(ev(2)), None);
        assert_eq!(q.push_overwrite(ev(3)), Some(ev(1)));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.peek(), Some(ev(2)));
        assert_eq!(q.pop(), Some(ev(2)));
        assert_eq!(q.pop(), Some(ev(3)));
    }

    #[test]
    fn zero_capacity_never_stores() {
        let q: EventQueue<0> = EventQueue::new();
        assert!(q.push(ev(1)).is_err());
        assert_eq!(q.push_overwrite(ev(2)), Some(ev(2)));
        assert_eq!(q.pop(), None);
        assert_eq!(q.dropped(), 2);
    }

    #[test]
    fn clear_empties_but_keeps_drop_count() {
        let q: EventQueue<1> = EventQueue::new();
        q.push(ev(1)).unwrap();
        let _ = q.push(ev(2));
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 1);
        q.push(ev(3)).unwrap();
        assert_eq!(q.pop(), Some(ev(3)));
    }

    #[test]
    fn sender_stamps_with_clock() {
        let q: EventQueue<4> = EventQueue::new();
        let clock = TickClock::new(250);
        clock.tick();
        clock.tick();
        let tx = EventSender::new(&q, &clock);
        tx.post(EventKind::GateRising, 3).unwrap();
        let got = q.pop().unwrap();
        assert_eq!(got.kind(), EventKind::GateRising);
        assert_eq!(got.data(), 3);
        assert_eq!(got.timestamp(), 500);
    }
}
