use crate::model::{Cloudlet, SchedulerDiscipline, Vm, VmId};
use super::policy::AllocationPolicy;

/// Least-loaded VM, where load is the total length of cloudlets already
/// assigned to it. Co-resident cloudlets share the VM's rate.
#[derive(Debug, Default)]
pub struct TimeSharedPolicy;

impl TimeSharedPolicy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl AllocationPolicy for TimeSharedPolicy {
    fn assign(&mut self, _cloudlet: &Cloudlet, vms: &[Vm]) -> Option<VmId> {
        vms.iter()
            .filter(|vm| vm.is_available())
            .min_by_key(|vm| (vm.assigned_length, vm.id))
            .map(|vm| vm.id)
    }

    fn discipline(&self) -> SchedulerDiscipline {
        SchedulerDiscipline::TimeShared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: VmId, load: u64) -> Vm {
        let mut vm = Vm::new(
            id,
            2000.0,
            1,
            512,
            1000,
            10_000,
            "Xen",
            SchedulerDiscipline::TimeShared,
        );
        vm.start(0, 0.0);
        vm.assigned_length = load;
        vm
    }

    #[test]
    fn picks_least_loaded() {
        let vms = vec![vm(0, 3000), vm(1, 1000), vm(2, 2000)];
        let mut policy = TimeSharedPolicy::new();
        assert_eq!(policy.assign(&Cloudlet::new(0, 1000, 1, 300, 300), &vms), Some(1));
    }

    #[test]
    fn ties_go_to_lowest_id() {
        let vms = vec![vm(1, 0), vm(0, 0)];
        let cloudlet = Cloudlet::new(0, 1000, 1, 300, 300);
        assert_eq!(TimeSharedPolicy::new().assign(&cloudlet, &vms), Some(0));
    }
}
