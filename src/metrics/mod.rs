pub mod collector;
pub mod sla;

pub use collector::MetricsCollector;
pub use sla::SlaPolicy;
