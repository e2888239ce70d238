// stackless cooperative threads for eurorack-style control hardware

#![cfg_attr(not(test), no_std)]

pub mod drivers;
pub mod kernel;
