//! netcode-protocol - Tick orchestration
//!
//! Drives one server and any number of clients through the fixed six-step
//! tick, advancing a [`SimulationClock`] between ticks.

mod clock;
mod simulation;

pub use clock::*;
pub use simulation::*;
