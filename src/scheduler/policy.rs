use std::fmt;
use std::str::FromStr;

use crate::config::{PolicyParameters, StrategyPresets};
use crate::error::SimulationError;
use crate::model::{Cloudlet, SchedulerDiscipline, Vm, VmId};
use super::best_fit::BestFitPolicy;
use super::round_robin::RoundRobinPolicy;
use super::time_shared::TimeSharedPolicy;

/// Maps an arriving cloudlet to a VM.
///
/// Implementations must be deterministic: identical inputs give identical
/// decisions. VMs that are not available (not started or already stopped)
/// must be skipped.
pub trait AllocationPolicy: Send {
    /// Returns the chosen VM, or `None` when the cloudlet cannot be placed.
    fn assign(&mut self, cloudlet: &Cloudlet, vms: &[Vm]) -> Option<VmId>;

    /// Scheduling discipline of the VMs this policy drives.
    fn discipline(&self) -> SchedulerDiscipline;

    /// Whether cloudlets that failed to fit get another chance when capacity
    /// is released.
    fn requeues_on_release(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    BestFit,
    RoundRobin,
    TimeShared,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::BestFit, Strategy::RoundRobin, Strategy::TimeShared];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::BestFit => "BestFit",
            Strategy::RoundRobin => "RoundRobin",
            Strategy::TimeShared => "TimeShared",
        }
    }

    pub fn policy(&self) -> Box<dyn AllocationPolicy> {
        match self {
            Strategy::BestFit => Box::new(BestFitPolicy::new()),
            Strategy::RoundRobin => Box::new(RoundRobinPolicy::new()),
            Strategy::TimeShared => Box::new(TimeSharedPolicy::new()),
        }
    }

    pub fn parameters(&self, presets: &StrategyPresets) -> PolicyParameters {
        match self {
            Strategy::BestFit => presets.best_fit,
            Strategy::RoundRobin => presets.round_robin,
            Strategy::TimeShared => presets.time_shared,
        }
    }

    /// Resolves every name up front so that one bad name rejects the batch.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Strategy>, SimulationError> {
        names.iter().map(|name| name.as_ref().parse()).collect()
    }
}

impl FromStr for Strategy {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| SimulationError::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
