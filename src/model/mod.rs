pub mod cloudlet;
pub mod host;
pub mod request;
pub mod scenario;
pub mod vm;

pub use cloudlet::{Cloudlet, CloudletId, CloudletState};
pub use host::{Datacenter, DatacenterCharacteristics, Host, HostId, Placement};
pub use request::{SimulationRequest, SimulationResult};
pub use scenario::Scenario;
pub use vm::{SchedulerDiscipline, Vm, VmId};
