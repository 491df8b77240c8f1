use tracing::trace;

use crate::model::{Cloudlet, SchedulerDiscipline, Vm, VmId};
use super::policy::AllocationPolicy;

/// Tightest fit on space-shared VMs.
#[derive(Debug, Default)]
pub struct BestFitPolicy;

impl BestFitPolicy {
    pub fn new() -> Self {
        Default::default()
    }

    fn residual_mips(vm: &Vm, cloudlet: &Cloudlet) -> Option<f64> {
        if vm.is_available() && vm.free_pes() >= cloudlet.pes {
            Some(vm.free_mips() - cloudlet.pes as f64 * vm.mips)
        } else {
            None
        }
    }
}

impl AllocationPolicy for BestFitPolicy {
    fn assign(&mut self, cloudlet: &Cloudlet, vms: &[Vm]) -> Option<VmId> {
        let mut best: Option<(f64, VmId)> = None;
        for vm in vms {
            if let Some(residual) = Self::residual_mips(vm, cloudlet) {
                // strict comparison keeps the lowest id on ties
                if best.map_or(true, |(r, id)| residual < r || (residual == r && vm.id < id)) {
                    best = Some((residual, vm.id));
                }
            }
        }
        trace!("BestFit: cloudlet {} -> {:?}", cloudlet.id, best);
        best.map(|(_, id)| id)
    }

    fn discipline(&self) -> SchedulerDiscipline {
        SchedulerDiscipline::SpaceShared
    }

    fn requeues_on_release(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: VmId, pes: u32, busy: u32) -> Vm {
        let mut vm = Vm::new(
            id,
            1000.0,
            pes,
            512,
            1000,
            10_000,
            "Xen",
            SchedulerDiscipline::SpaceShared,
        );
        vm.start(0, 0.0);
        vm.requested_pes = busy;
        vm
    }

    fn cloudlet(pes: u32) -> Cloudlet {
        Cloudlet::new(0, 1000, pes, 300, 300)
    }

    #[test]
    fn picks_minimal_residual_among_fitting() {
        let vms = vec![vm(0, 4, 0), vm(1, 2, 0), vm(2, 1, 0), vm(3, 3, 0)];
        let mut policy = BestFitPolicy::new();
        assert_eq!(policy.assign(&cloudlet(2), &vms), Some(1));
        assert_eq!(policy.assign(&cloudlet(1), &vms), Some(2));
        assert_eq!(policy.assign(&cloudlet(3), &vms), Some(3));
        assert_eq!(policy.assign(&cloudlet(4), &vms), Some(0));
    }

    #[test]
    fn never_picks_vm_without_room() {
        let vms = vec![vm(0, 4, 3), vm(1, 2, 0), vm(2, 1, 1)];
        let mut policy = BestFitPolicy::new();
        // vm 0 has one free PE, vm 2 none
        assert_eq!(policy.assign(&cloudlet(2), &vms), Some(1));
        assert_eq!(policy.assign(&cloudlet(1), &vms), Some(0));
        assert_eq!(policy.assign(&cloudlet(3), &vms), None);
    }

    #[test]
    fn ties_go_to_lowest_id() {
        let vms = vec![vm(2, 1, 0), vm(0, 1, 0), vm(1, 1, 0)];
        assert_eq!(BestFitPolicy::new().assign(&cloudlet(1), &vms), Some(0));
    }

    #[test]
    fn skips_unavailable_vms() {
        let mut stopped = vm(0, 1, 0);
        stopped.stop(1.0);
        let not_started = Vm::new(
            1,
            1000.0,
            1,
            512,
            1000,
            10_000,
            "Xen",
            SchedulerDiscipline::SpaceShared,
        );
        assert_eq!(BestFitPolicy::new().assign(&cloudlet(1), &[stopped, not_started]), None);
    }
}
