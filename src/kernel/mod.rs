// Cooperative kernel: stackless threads, scheduler, and the event path
// from interrupts into thread bodies.
// Single core, no preemption. Interrupts only ever touch the event queue,
// semaphores and the tick clock, each behind a short critical section.

pub mod clock;
pub mod event;
pub mod interval;
pub mod pt;
pub mod scheduler;
pub mod sem;
pub mod thread;

pub use clock::{Clock, TickClock, elapsed};
pub use event::{EVENT_QUEUE_CAPACITY, Event, EventKind, EventPort, EventQueue, EventSender, PushError};
pub use interval::Interval;
pub use pt::{Context, Lc, Protothread, Pt, START, Status, Step, from_fn};
pub use scheduler::{AddError, MAX_THREADS, Scheduler};
pub use sem::Semaphore;
pub use thread::{BindError, Task, Thread};
