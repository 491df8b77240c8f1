//! Fresh resource and workload instantiation for a single run.

use crate::config::{ensure_positive, Config, PolicyParameters, WorkloadShape};
use crate::error::SimulationError;
use super::cloudlet::{Cloudlet, CloudletId};
use super::host::Datacenter;
use super::request::SimulationRequest;
use super::vm::{SchedulerDiscipline, Vm, VmId};

#[derive(Debug, Clone)]
pub struct Scenario {
    pub datacenter: Datacenter,
    pub vms: Vec<Vm>,
    pub cloudlets: Vec<Cloudlet>,
    pub overhead_factor: f64,
}

impl Scenario {
    pub fn build(
        request: &SimulationRequest,
        config: &Config,
        params: PolicyParameters,
        discipline: SchedulerDiscipline,
    ) -> Result<Self, SimulationError> {
        request.validate()?;
        ensure_positive("vm_mips", params.vm_mips)?;

        let datacenter = Datacenter::from_config(&config.datacenter)?;

        let vms = (0..request.number_of_vms)
            .map(|id| {
                Vm::new(
                    id as VmId,
                    params.vm_mips,
                    config.vm.pes,
                    request.vm_ram,
                    config.vm.bw,
                    config.vm.size,
                    &config.vm.vmm,
                    discipline,
                )
            })
            .collect();

        let workload = &config.workload;
        if workload.unit_length == 0 {
            return Err(SimulationError::invalid("workload.unit_length must be positive"));
        }
        if workload.pes == 0 || workload.pes > config.vm.pes {
            return Err(SimulationError::invalid(format!(
                "cloudlets need {} pes but vms have {}",
                workload.pes, config.vm.pes
            )));
        }
        let (count, length) = match workload.shape {
            WorkloadShape::Split => (request.number_of_cloudlets, workload.unit_length),
            WorkloadShape::Single => (
                1,
                workload
                    .unit_length
                    .checked_mul(request.number_of_cloudlets as u64)
                    .ok_or_else(|| SimulationError::invalid("cloudlet length overflows"))?,
            ),
        };
        let cloudlets = (0..count)
            .map(|id| {
                Cloudlet::new(
                    id as CloudletId,
                    length,
                    workload.pes,
                    workload.file_size,
                    workload.output_size,
                )
                .with_submission_time(id as f64 * workload.submission_interval)
            })
            .collect();

        Ok(Self {
            datacenter,
            vms,
            cloudlets,
            overhead_factor: request.overhead_factor(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cloudlets: u32) -> SimulationRequest {
        SimulationRequest {
            number_of_users: 100,
            number_of_vms: 3,
            number_of_cloudlets: cloudlets,
            vm_ram: 512,
            sla_threshold: 10.0,
            strategies: vec![],
        }
    }

    #[test]
    fn split_workload_creates_one_cloudlet_per_unit() {
        let config = Config::default();
        let scenario = Scenario::build(
            &request(4),
            &config,
            config.strategies.round_robin,
            SchedulerDiscipline::SpaceShared,
        )
        .unwrap();
        assert_eq!(scenario.vms.len(), 3);
        assert!(scenario.vms.iter().all(|vm| vm.mips == 1500.0 && vm.ram == 512));
        assert_eq!(scenario.cloudlets.len(), 4);
        assert!(scenario.cloudlets.iter().all(|c| c.length == 1000 && c.submission_time == 0.0));
        assert_eq!(scenario.overhead_factor, 1.1);
    }

    #[test]
    fn single_workload_concatenates_units() {
        let mut config = Config::default();
        config.workload.shape = WorkloadShape::Single;
        let scenario = Scenario::build(
            &request(4),
            &config,
            config.strategies.best_fit,
            SchedulerDiscipline::SpaceShared,
        )
        .unwrap();
        assert_eq!(scenario.cloudlets.len(), 1);
        assert_eq!(scenario.cloudlets[0].length, 4000);
    }

    #[test]
    fn submission_interval_spaces_arrivals() {
        let mut config = Config::default();
        config.workload.submission_interval = 0.5;
        let scenario = Scenario::build(
            &request(3),
            &config,
            config.strategies.best_fit,
            SchedulerDiscipline::SpaceShared,
        )
        .unwrap();
        let times: Vec<f64> = scenario.cloudlets.iter().map(|c| c.submission_time).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn rejects_cloudlets_wider_than_vms() {
        let mut config = Config::default();
        config.workload.pes = 2;
        let result = Scenario::build(
            &request(1),
            &config,
            config.strategies.round_robin,
            SchedulerDiscipline::SpaceShared,
        );
        assert!(matches!(result, Err(SimulationError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_non_positive_rate() {
        let config = Config::default();
        let result = Scenario::build(
            &request(1),
            &config,
            PolicyParameters { vm_mips: 0.0 },
            SchedulerDiscipline::TimeShared,
        );
        assert!(matches!(result, Err(SimulationError::InvalidConfiguration(_))));
    }
}
