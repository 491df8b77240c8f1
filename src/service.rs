use std::panic;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{EngineOptions, Simulation};
use crate::error::SimulationError;
use crate::metrics::MetricsCollector;
use crate::model::{Scenario, SimulationRequest, SimulationResult};
use crate::scheduler::Strategy;

/// Runs every requested strategy against a fresh copy of the described
/// workload and collects one result per strategy, in request order.
#[derive(Debug, Clone)]
pub struct SimulationService {
    config: Arc<Config>,
}

impl SimulationService {
    pub fn new(config: Config) -> Result<Self, SimulationError> {
        config.validate()?;
        info!(
            "Simulation service initialized with {} host group(s)",
            config.datacenter.hosts.len()
        );
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run_simulations(
        &self,
        request: &SimulationRequest,
    ) -> Result<Vec<SimulationResult>, SimulationError> {
        let strategies = Self::prepare(request)?;
        strategies
            .into_iter()
            .map(|strategy| run_strategy(&self.config, request, strategy))
            .collect()
    }

    /// Same results as [`run_simulations`](Self::run_simulations), with every
    /// strategy on its own blocking task. Runs share nothing but the
    /// read-only request and config.
    pub async fn run_simulations_concurrently(
        &self,
        request: &SimulationRequest,
    ) -> Result<Vec<SimulationResult>, SimulationError> {
        let strategies = Self::prepare(request)?;
        let request = Arc::new(request.clone());

        let handles: Vec<_> = strategies
            .into_iter()
            .map(|strategy| {
                let config = self.config.clone();
                let request = request.clone();
                let handle =
                    tokio::task::spawn_blocking(move || run_strategy(&config, &request, strategy));
                (strategy, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (strategy, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result?),
                Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    error!("Simulation task for {} did not complete: {}", strategy, e);
                    return Err(SimulationError::Cancelled(strategy.name().to_string()));
                }
            }
        }
        Ok(results)
    }

    fn prepare(request: &SimulationRequest) -> Result<Vec<Strategy>, SimulationError> {
        request.validate()?;
        let strategies = Strategy::parse_all(&request.strategies)?;
        debug!(
            "Request: {} users, {} vms, {} cloudlets, strategies {:?}",
            request.number_of_users,
            request.number_of_vms,
            request.number_of_cloudlets,
            request.strategies
        );
        Ok(strategies)
    }
}

fn run_strategy(
    config: &Config,
    request: &SimulationRequest,
    strategy: Strategy,
) -> Result<SimulationResult, SimulationError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("simulation", strategy = strategy.name(), %run_id);
    let _enter = span.enter();

    let started = Instant::now();
    let policy = strategy.policy();
    let scenario = Scenario::build(
        request,
        config,
        strategy.parameters(&config.strategies),
        policy.discipline(),
    )?;
    let time_limit = config
        .engine
        .time_limit_seconds
        .map(|limit| {
            Duration::try_from_secs_f64(limit).map_err(|e| {
                SimulationError::invalid(format!("engine.time_limit_seconds {limit}: {e}"))
            })
        })
        .transpose()?;
    let options = EngineOptions {
        max_retries: config.engine.max_retries,
        time_limit,
    };

    let mut simulation = Simulation::new(strategy.name(), scenario, policy, options)?;
    simulation.run()?;
    let outcome = simulation.into_outcome();

    let result =
        MetricsCollector::new(&config.billing).collect(strategy.name(), request, &outcome)?;

    ::metrics::counter!("simulation_runs_total", "strategy" => strategy.name()).increment(1);
    ::metrics::counter!("simulation_cloudlets_failed_total", "strategy" => strategy.name())
        .increment(u64::from(result.failed_cloudlets));
    ::metrics::histogram!("simulation_execution_time_seconds", "strategy" => strategy.name())
        .record(result.execution_time);

    debug!(
        "Run finished in {:?} wall time, {} events",
        started.elapsed(),
        outcome.processed_events
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(strategies: &[&str]) -> SimulationRequest {
        SimulationRequest {
            number_of_users: 0,
            number_of_vms: 2,
            number_of_cloudlets: 4,
            vm_ram: 512,
            sla_threshold: 10.0,
            strategies: strategies.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.billing.cost_per_second = -1.0;
        assert!(matches!(
            SimulationService::new(config),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn results_follow_request_order() {
        let service = SimulationService::new(Config::default()).unwrap();
        let results = service
            .run_simulations(&request(&["TimeShared", "BestFit", "RoundRobin"]))
            .unwrap();
        let names: Vec<_> = results.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(names, vec!["TimeShared", "BestFit", "RoundRobin"]);
    }

    #[test]
    fn one_unknown_name_rejects_the_batch() {
        let service = SimulationService::new(Config::default()).unwrap();
        let err = service
            .run_simulations(&request(&["BestFit", "bestfit"]))
            .unwrap_err();
        assert_eq!(err, SimulationError::UnknownStrategy("bestfit".to_string()));
    }

    #[test]
    fn zero_time_limit_times_out() {
        let mut config = Config::default();
        config.engine.time_limit_seconds = Some(0.0);
        let service = SimulationService::new(config).unwrap();
        let err = service.run_simulations(&request(&["RoundRobin"])).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Timeout { ref strategy, .. } if strategy == "RoundRobin"
        ));
    }

    #[test]
    fn huge_time_limit_is_rejected_up_front() {
        let mut config = Config::default();
        config.engine.time_limit_seconds = Some(1e20);
        assert!(matches!(
            SimulationService::new(config),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_runs_match_sequential_runs() {
        let service = SimulationService::new(Config::default()).unwrap();
        let request = request(&["BestFit", "RoundRobin", "TimeShared"]);
        let sequential = service.run_simulations(&request).unwrap();
        let concurrent = service.run_simulations_concurrently(&request).await.unwrap();
        assert_eq!(sequential, concurrent);
    }
}
