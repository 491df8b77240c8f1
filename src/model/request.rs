use serde::{Deserialize, Serialize};

use crate::config::ensure_positive;
use crate::error::SimulationError;
use super::host::HostId;

/// Workload description submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub number_of_users: u32,
    pub number_of_vms: u32,
    pub number_of_cloudlets: u32,
    pub vm_ram: u64,
    /// Seconds of simulated time.
    pub sla_threshold: f64,
    pub strategies: Vec<String>,
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.number_of_vms == 0 {
            return Err(SimulationError::invalid("numberOfVms must be positive"));
        }
        if self.number_of_cloudlets == 0 {
            return Err(SimulationError::invalid("numberOfCloudlets must be positive"));
        }
        if self.vm_ram == 0 {
            return Err(SimulationError::invalid("vmRam must be positive"));
        }
        ensure_positive("slaThreshold", self.sla_threshold)
    }

    /// Slowdown applied to every cloudlet to account for concurrent user
    /// sessions.
    pub fn overhead_factor(&self) -> f64 {
        1.0 + self.number_of_users as f64 / 1000.0
    }
}

/// Metrics of one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub strategy: String,
    pub execution_time: f64,
    pub cost: f64,
    pub energy_consumption: f64,
    pub sla_violation: f64,
    pub total_cloudlets_processed: u32,
    pub failed_cloudlets: u32,
    pub average_execution_time: f64,
    pub sla_violated_cloudlets: u32,
    pub resource_cost: f64,
    pub average_vm_utilization: f64,
    pub oversubscribed_hosts: Vec<HostId>,
}
