pub mod event;
pub mod simulation;

pub use event::{Event, EventId, EventKind, TraceEntry};
pub use simulation::{Assignment, EngineOptions, Simulation, SimulationOutcome, SimulationState};
