//! Discrete-event simulation of cloudlet scheduling over a virtualized
//! datacenter. Each allocation strategy runs in isolation against the same
//! workload and reports execution time, cost, energy and SLA metrics.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use error::SimulationError;
pub use model::{SimulationRequest, SimulationResult};
pub use scheduler::Strategy;
pub use service::SimulationService;
