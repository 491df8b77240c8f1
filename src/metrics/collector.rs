use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::config::BillingConfig;
use crate::engine::SimulationOutcome;
use crate::error::SimulationError;
use crate::model::{SimulationRequest, SimulationResult};
use super::sla::SlaPolicy;

/// Turns a stopped run into a result record.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    billing: BillingConfig,
}

impl MetricsCollector {
    pub fn new(billing: &BillingConfig) -> Self {
        Self {
            billing: billing.clone(),
        }
    }

    pub fn collect(
        &self,
        strategy: &str,
        request: &SimulationRequest,
        outcome: &SimulationOutcome,
    ) -> Result<SimulationResult, SimulationError> {
        let sla = SlaPolicy::new(request.sla_threshold)?;

        let execution_time = Self::execution_time(outcome);
        let vm_count = outcome.vms.len() as f64;
        let cost = execution_time * self.billing.cost_per_second * vm_count;
        let energy_consumption = execution_time * self.billing.energy_per_second * vm_count;

        let durations: Vec<f64> = outcome.finished().filter_map(|c| c.execution_time()).collect();
        let average_execution_time = if durations.is_empty() {
            0.0
        } else {
            durations.iter().mean()
        };

        let characteristics = &outcome.datacenter.characteristics;
        let resource_cost = outcome
            .vms
            .iter()
            .map(|vm| characteristics.vm_resource_cost(vm))
            .sum::<f64>();

        let average_vm_utilization = if outcome.vms.is_empty() {
            0.0
        } else {
            outcome
                .vms
                .iter()
                .map(|vm| vm.utilization(execution_time))
                .sum::<f64>()
                / vm_count
        };

        let result = SimulationResult {
            strategy: strategy.to_string(),
            execution_time,
            cost,
            energy_consumption,
            sla_violation: sla.violation(execution_time),
            total_cloudlets_processed: outcome.finished().count() as u32,
            failed_cloudlets: outcome.failed().count() as u32,
            average_execution_time,
            sla_violated_cloudlets: sla.violated_cloudlets(outcome.finished()) as u32,
            resource_cost,
            average_vm_utilization,
            oversubscribed_hosts: outcome.oversubscribed_hosts.iter().copied().collect(),
        };
        debug!("{:?}", result);
        info!(
            "{}: execution time {:.4}s, cost {:.4}, energy {:.4}, SLA violation {:.4}",
            strategy,
            result.execution_time,
            result.cost,
            result.energy_consumption,
            result.sla_violation
        );
        Ok(result)
    }

    /// Latest finish time over finished cloudlets, 0 if none finished.
    pub fn execution_time(outcome: &SimulationOutcome) -> f64 {
        outcome
            .finished()
            .filter_map(|c| c.finish_time)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{EngineOptions, Simulation};
    use crate::model::Scenario;
    use crate::scheduler::Strategy;

    fn request(vms: u32, cloudlets: u32, sla_threshold: f64) -> SimulationRequest {
        SimulationRequest {
            number_of_users: 0,
            number_of_vms: vms,
            number_of_cloudlets: cloudlets,
            vm_ram: 512,
            sla_threshold,
            strategies: vec![],
        }
    }

    fn outcome(
        strategy: Strategy,
        request: &SimulationRequest,
        config: &Config,
    ) -> SimulationOutcome {
        let policy = strategy.policy();
        let scenario = Scenario::build(
            request,
            config,
            strategy.parameters(&config.strategies),
            policy.discipline(),
        )
        .unwrap();
        let options = EngineOptions {
            max_retries: config.engine.max_retries,
            time_limit: None,
        };
        let mut sim = Simulation::new(strategy.name(), scenario, policy, options).unwrap();
        sim.run().unwrap();
        sim.into_outcome()
    }

    #[test]
    fn linear_cost_and_energy() {
        let config = Config::default();
        let request = request(2, 4, 1.0);
        let outcome = outcome(Strategy::BestFit, &request, &config);
        let result = MetricsCollector::new(&config.billing)
            .collect("BestFit", &request, &outcome)
            .unwrap();
        // four unit cloudlets on two 1000 MIPS vms
        assert_eq!(result.execution_time, 2.0);
        assert_eq!(result.cost, 2.0 * 3.0 * 2.0);
        assert_eq!(result.energy_consumption, 2.0 * 0.5 * 2.0);
        assert_eq!(result.sla_violation, 1.0);
        assert_eq!(result.total_cloudlets_processed, 4);
        assert_eq!(result.failed_cloudlets, 0);
        assert_eq!(result.average_execution_time, 1.0);
        assert_eq!(result.sla_violated_cloudlets, 2);
        assert_eq!(result.average_vm_utilization, 1.0);
        assert_eq!(result.oversubscribed_hosts, vec![0]);
    }

    #[test]
    fn nothing_finished_means_zero_time() {
        let config = Config::default();
        let request = request(1, 1, 1.0);
        let mut outcome = outcome(Strategy::RoundRobin, &request, &config);
        for cloudlet in &mut outcome.cloudlets {
            cloudlet.state = crate::model::CloudletState::Failed;
        }
        let result = MetricsCollector::new(&config.billing)
            .collect("RoundRobin", &request, &outcome)
            .unwrap();
        assert_eq!(result.execution_time, 0.0);
        assert_eq!(result.cost, 0.0);
        assert_eq!(result.sla_violation, 0.0);
        assert_eq!(result.average_execution_time, 0.0);
        assert_eq!(result.average_vm_utilization, 0.0);
    }

    #[test]
    fn invalid_threshold_is_an_error() {
        let config = Config::default();
        let outcome = outcome(Strategy::TimeShared, &request(1, 1, 1.0), &config);
        let result = MetricsCollector::new(&config.billing).collect(
            "TimeShared",
            &request(1, 1, 0.0),
            &outcome,
        );
        assert!(matches!(result, Err(SimulationError::InvalidConfiguration(_))));
    }
}
