// Polled edge detection for inputs without interrupt wiring
//
// Samples an embedded-hal input pin from a thread body and reports
// transitions of the *asserted* state, so an active-low button reads
// Rising on press. The first sample only establishes the baseline.

use embedded_hal::digital::InputPin;

use crate::drivers::irq::{Edge, EdgeHandler};

pub struct EdgeDetector<P> {
    pin: P,
    active_low: bool,
    asserted: Option<bool>,
}

impl<P: InputPin> EdgeDetector<P> {
    pub const fn new(pin: P, active_low: bool) -> Self {
        Self {
            pin,
            active_low,
            asserted: None,
        }
    }

    pub fn poll(&mut self) -> Result<Option<Edge>, P::Error> {
        let asserted = self.pin.is_high()? != self.active_low;
        let edge = match self.asserted.replace(asserted) {
            Some(prev) if prev != asserted => Some(Edge::from_level(asserted)),
            _ => None,
        };
        Ok(edge)
    }

    /// Poll and hand any edge to `handler` as if it came from `line`.
    pub fn poll_into(&mut self, line: u8, handler: &dyn EdgeHandler) -> Result<bool, P::Error> {
        match self.poll()? {
            Some(edge) => {
                handler.on_edge(line, edge);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Last sampled state; `None` before the first poll.
    pub fn is_asserted(&self) -> Option<bool> {
        self.asserted
    }

    pub fn release(self) -> P {
        self.pin
    }
}
