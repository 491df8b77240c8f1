use crate::model::{Cloudlet, SchedulerDiscipline, Vm, VmId};
use super::policy::AllocationPolicy;

/// Cycles over the VM list regardless of fit. Cloudlets that land on a busy
/// VM wait in its queue.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    next: usize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl AllocationPolicy for RoundRobinPolicy {
    fn assign(&mut self, _cloudlet: &Cloudlet, vms: &[Vm]) -> Option<VmId> {
        if vms.is_empty() {
            return None;
        }
        for offset in 0..vms.len() {
            let index = (self.next + offset) % vms.len();
            if vms[index].is_available() {
                self.next = (index + 1) % vms.len();
                return Some(vms[index].id);
            }
        }
        None
    }

    fn discipline(&self) -> SchedulerDiscipline {
        SchedulerDiscipline::SpaceShared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vms(count: u32) -> Vec<Vm> {
        (0..count)
            .map(|id| {
                let mut vm = Vm::new(
                    id,
                    1500.0,
                    1,
                    512,
                    1000,
                    10_000,
                    "Xen",
                    SchedulerDiscipline::SpaceShared,
                );
                vm.start(0, 0.0);
                vm
            })
            .collect()
    }

    fn sequence(policy: &mut RoundRobinPolicy, vms: &[Vm], n: u32) -> Vec<VmId> {
        (0..n)
            .filter_map(|id| policy.assign(&Cloudlet::new(id, 1000, 1, 300, 300), vms))
            .collect()
    }

    #[test]
    fn cycles_in_order() {
        let vms = vms(3);
        let mut policy = RoundRobinPolicy::new();
        assert_eq!(sequence(&mut policy, &vms, 7), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn assigns_even_when_vm_is_full() {
        let mut vms = vms(1);
        vms[0].requested_pes = 1;
        let cloudlet = Cloudlet::new(0, 1000, 1, 300, 300);
        assert_eq!(RoundRobinPolicy::new().assign(&cloudlet, &vms), Some(0));
    }

    #[test]
    fn repeated_runs_match() {
        let vms = vms(4);
        let first = sequence(&mut RoundRobinPolicy::new(), &vms, 10);
        let second = sequence(&mut RoundRobinPolicy::new(), &vms, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn no_vms_means_no_assignment() {
        assert_eq!(RoundRobinPolicy::new().assign(&Cloudlet::new(0, 1000, 1, 300, 300), &[]), None);
    }
}
