// Hardware-facing glue: interrupt routing and polled inputs.
// Concrete device wrappers (encoders, CV inputs, ...) live with the board.

pub mod edge;
pub mod irq;

pub use edge::EdgeDetector;
pub use irq::{Edge, EdgeForwarder, EdgeHandler, IrqTable, RegisterError};
