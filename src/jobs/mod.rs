//! Background collection and retention.

mod collector;
mod scheduler;

pub use collector::*;
pub use scheduler::*;
