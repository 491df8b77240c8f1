pub mod best_fit;
pub mod policy;
pub mod round_robin;
pub mod time_shared;

pub use best_fit::BestFitPolicy;
pub use policy::{AllocationPolicy, Strategy};
pub use round_robin::RoundRobinPolicy;
pub use time_shared::TimeSharedPolicy;
