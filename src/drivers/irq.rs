//! Interrupt line routing
//!
//! One table maps hardware line numbers (GPIO pins, comparator channels,
//! ...) to the object that handles edges on that line. The board's single
//! GPIO interrupt calls [`IrqTable::dispatch`]; handlers carry their own
//! [`EventSender`], so nothing reaches for a global queue.
//!
//! The table is filled before interrupts are enabled and only read from
//! interrupt context afterwards.

use core::fmt;

use log::debug;

use crate::kernel::event::{EventKind, EventSender};

/// Default number of routed lines.
pub const MAX_LINES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Edge that leads to `level`.
    pub const fn from_level(level: bool) -> Self {
        if level { Edge::Rising } else { Edge::Falling }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => write!(f, "rising"),
            Edge::Falling => write!(f, "falling"),
        }
    }
}

/// Runs in interrupt context: must not block, wait, or log.
pub trait EdgeHandler: Sync {
    fn on_edge(&self, line: u8, edge: Edge);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    Full,
    LineTaken(u8),
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::Full => write!(f, "irq table full"),
            RegisterError::LineTaken(line) => write!(f, "line {} already routed", line),
        }
    }
}

impl core::error::Error for RegisterError {}

pub struct IrqTable<'a, const N: usize = MAX_LINES> {
    routes: [Option<(u8, &'a dyn EdgeHandler)>; N],
    len: usize,
}

impl<'a, const N: usize> IrqTable<'a, N> {
    pub const fn new() -> Self {
        Self {
            routes: [None; N],
            len: 0,
        }
    }

    pub fn register(&mut self, line: u8, handler: &'a dyn EdgeHandler) -> Result<(), RegisterError> {
        if self.contains(line) {
            return Err(RegisterError::LineTaken(line));
        }
        if self.len >= N {
            return Err(RegisterError::Full);
        }
        self.routes[self.len] = Some((line, handler));
        self.len += 1;
        debug!("irq: routed line {}", line);
        Ok(())
    }

    pub fn unregister(&mut self, line: u8) -> bool {
        let Some(idx) = self.position(line) else {
            return false;
        };
        self.routes.copy_within(idx + 1..self.len, idx);
        self.len -= 1;
        self.routes[self.len] = None;
        true
    }

    /// Hand an edge to the handler routed for `line`. Returns false for
    /// unrouted lines.
    pub fn dispatch(&self, line: u8, edge: Edge) -> bool {
        match self.position(line).and_then(|i| self.routes[i]) {
            Some((_, handler)) => {
                handler.on_edge(line, edge);
                true
            }
            None => false,
        }
    }

    /// Dispatch a raw rise/fall event mask as delivered by most GPIO
    /// blocks. Both edges set means both are dispatched, falling first.
    pub fn dispatch_mask(&self, line: u8, rising: bool, falling: bool) -> bool {
        let mut handled = false;
        if falling {
            handled |= self.dispatch(line, Edge::Falling);
        }
        if rising {
            handled |= self.dispatch(line, Edge::Rising);
        }
        handled
    }

    pub fn contains(&self, line: u8) -> bool {
        self.position(line).is_some()
    }

    fn position(&self, line: u8) -> Option<usize> {
        self.routes[..self.len]
            .iter()
            .position(|r| matches!(r, Some((l, _)) if *l == line))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for IrqTable<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns edges into queued events: one optional kind per edge direction
/// and a fixed payload (usually the input's index).
pub struct EdgeForwarder<'a> {
    sender: EventSender<'a>,
    rising: Option<EventKind>,
    falling: Option<EventKind>,
    data: u32,
}

impl<'a> EdgeForwarder<'a> {
    pub const fn new(
        sender: EventSender<'a>,
        rising: Option<EventKind>,
        falling: Option<EventKind>,
        data: u32,
    ) -> Self {
        Self {
            sender,
            rising,
            falling,
            data,
        }
    }

    /// Gate/trigger input: rising and falling edges.
    pub const fn gate(sender: EventSender<'a>, index: u32) -> Self {
        Self::new(
            sender,
            Some(EventKind::GateRising),
            Some(EventKind::GateFalling),
            index,
        )
    }

    /// Push button wired active-low: the falling edge is the press.
    pub const fn button(sender: EventSender<'a>, index: u32) -> Self {
        Self::new(
            sender,
            Some(EventKind::ButtonRelease),
            Some(EventKind::ButtonPress),
            index,
        )
    }
}

impl EdgeHandler for EdgeForwarder<'_> {
    fn on_edge(&self, _line: u8, edge: Edge) {
        let kind = match edge {
            Edge::Rising => self.rising,
            Edge::Falling => self.falling,
        };
        if let Some(kind) = kind {
            // full queue: dropped and counted by the queue
            let _ = self.sender.post(kind, self.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::clock::TickClock;
    use crate::kernel::event::EventQueue;

    #[test]
    fn routes_edges_to_registered_handlers() {
        let q: EventQueue<8> = EventQueue::new();
        let clock = TickClock::new(1);
        let gate = EdgeForwarder::gate(EventSender::new(&q, &clock), 2);
        let button = EdgeForwarder::button(EventSender::new(&q, &clock), 0);

        let mut table: IrqTable<4> = IrqTable::new();
        table.register(14, &gate).unwrap();
        table.register(3, &button).unwrap();
        assert_eq!(table.register(14, &button), Err(RegisterError::LineTaken(14)));

        assert!(table.dispatch(14, Edge::Rising));
        assert!(table.dispatch(3, Edge::Falling));
        assert!(!table.dispatch(9, Edge::Rising));

        let first = q.pop().unwrap();
        assert_eq!((first.kind(), first.data()), (EventKind::GateRising, 2));
        let second = q.pop().unwrap();
        assert_eq!((second.kind(), second.data()), (EventKind::ButtonPress, 0));
        assert!(q.is_empty());
    }

    #[test]
    fn full_table_and_unregister() {
        let q: EventQueue<2> = EventQueue::new();
        let clock = TickClock::new(1);
        let h = EdgeForwarder::gate(EventSender::new(&q, &clock), 0);

        let mut table: IrqTable<2> = IrqTable::new();
        table.register(1, &h).unwrap();
        table.register(2, &h).unwrap();
        assert_eq!(table.register(3, &h), Err(RegisterError::Full));

        assert!(table.unregister(1));
        assert!(!table.unregister(1));
        assert_eq!(table.len(), 1);
        assert!(table.contains(2));
        table.register(3, &h).unwrap();
    }

    #[test]
    fn mask_dispatches_falling_then_rising() {
        let q: EventQueue<4> = EventQueue::new();
        let clock = TickClock::new(1);
        let h = EdgeForwarder::gate(EventSender::new(&q, &clock), 5);
        let mut table: IrqTable<1> = IrqTable::new();
        table.register(7, &h).unwrap();

        assert!(table.dispatch_mask(7, true, true));
        assert_eq!(q.pop().map(|e| e.kind()), Some(EventKind::GateFalling));
        assert_eq!(q.pop().map(|e| e.kind()), Some(EventKind::GateRising));
        assert!(!table.dispatch_mask(7, false, false));
    }

    #[test]
    fn unmapped_edge_posts_nothing() {
        let q: EventQueue<2> = EventQueue::new();
        let clock = TickClock::new(1);
        let h = EdgeForwarder::new(EventSender::new(&q, &clock), Some(EventKind::AdcReady), None, 1);
        h.on_edge(0, Edge::Falling);
        assert!(q.is_empty());
        h.on_edge(0, Edge::Rising);
        assert_eq!(q.len(), 1);
    }
}
