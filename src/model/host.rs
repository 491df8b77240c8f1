use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DatacenterConfig;
use crate::error::SimulationError;
use super::vm::{Vm, VmId};

pub type HostId = u32;

/// Pricing and platform description of a datacenter. Never consulted for
/// capacity decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterCharacteristics {
    pub arch: String,
    pub os: String,
    pub vmm: String,
    pub time_zone: f64,
    pub cost_per_second: f64,
    pub cost_per_mem: f64,
    pub cost_per_storage: f64,
    pub cost_per_bw: f64,
}

impl DatacenterCharacteristics {
    /// Price of the memory, storage and bandwidth held by one VM.
    pub fn vm_resource_cost(&self, vm: &Vm) -> f64 {
        self.cost_per_mem * vm.ram as f64
            + self.cost_per_storage * vm.size as f64
            + self.cost_per_bw * vm.bw as f64
    }
}

#[derive(Debug, Clone)]
pub struct Host {
    pub id: HostId,
    pub pes: u32,
    pub mips_per_pe: f64,
    pub ram: u64,
    pub storage: u64,
    pub bw: u64,
    pub used_mips: f64,
    pub used_ram: u64,
    pub used_storage: u64,
    pub used_bw: u64,
    pub vms: Vec<VmId>,
}

impl Host {
    pub fn new(id: HostId, pes: u32, mips_per_pe: f64, ram: u64, storage: u64, bw: u64) -> Self {
        Self {
            id,
            pes,
            mips_per_pe,
            ram,
            storage,
            bw,
            used_mips: 0.0,
            used_ram: 0,
            used_storage: 0,
            used_bw: 0,
            vms: Vec::new(),
        }
    }

    pub fn total_mips(&self) -> f64 {
        self.pes as f64 * self.mips_per_pe
    }

    pub fn free_mips(&self) -> f64 {
        self.total_mips() - self.used_mips
    }

    pub fn can_host(&self, vm: &Vm) -> bool {
        self.free_mips() >= vm.capacity()
            && self.used_ram.saturating_add(vm.ram) <= self.ram
            && self.used_storage.saturating_add(vm.size) <= self.storage
            && self.used_bw.saturating_add(vm.bw) <= self.bw
    }

    pub fn is_oversubscribed(&self) -> bool {
        self.used_mips > self.total_mips()
            || self.used_ram > self.ram
            || self.used_storage > self.storage
            || self.used_bw > self.bw
    }

    fn attach(&mut self, vm: &Vm) {
        self.used_mips += vm.capacity();
        self.used_ram = self.used_ram.saturating_add(vm.ram);
        self.used_storage = self.used_storage.saturating_add(vm.size);
        self.used_bw = self.used_bw.saturating_add(vm.bw);
        self.vms.push(vm.id);
    }

    fn detach(&mut self, vm: &Vm) {
        self.used_mips = (self.used_mips - vm.capacity()).max(0.0);
        self.used_ram = self.used_ram.saturating_sub(vm.ram);
        self.used_storage = self.used_storage.saturating_sub(vm.size);
        self.used_bw = self.used_bw.saturating_sub(vm.bw);
        self.vms.retain(|&id| id != vm.id);
    }
}

/// Outcome of placing a VM on a host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub host: HostId,
    /// The host's capacity was exceeded by this placement.
    pub oversubscribed: bool,
}

#[derive(Debug, Clone)]
pub struct Datacenter {
    pub name: String,
    pub characteristics: DatacenterCharacteristics,
    pub hosts: Vec<Host>,
}

impl Datacenter {
    pub fn new(
        name: impl Into<String>,
        characteristics: DatacenterCharacteristics,
        hosts: Vec<Host>,
    ) -> Result<Self, SimulationError> {
        if hosts.is_empty() {
            return Err(SimulationError::invalid("datacenter must have at least one host"));
        }
        for host in &hosts {
            if host.pes == 0
                || !(host.mips_per_pe > 0.0)
                || host.ram == 0
                || host.storage == 0
                || host.bw == 0
            {
                return Err(SimulationError::invalid(format!(
                    "host {} has a non-positive capacity",
                    host.id
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            characteristics,
            hosts,
        })
    }

    pub fn from_config(config: &DatacenterConfig) -> Result<Self, SimulationError> {
        let mut hosts = Vec::new();
        for group in &config.hosts {
            for _ in 0..group.count {
                let id = hosts.len() as HostId;
                hosts.push(Host::new(
                    id,
                    group.pes,
                    group.mips_per_pe,
                    group.ram,
                    group.storage,
                    group.bw,
                ));
            }
        }
        let characteristics = DatacenterCharacteristics {
            arch: config.arch.clone(),
            os: config.os.clone(),
            vmm: config.vmm.clone(),
            time_zone: config.time_zone,
            cost_per_second: config.cost_per_second,
            cost_per_mem: config.cost_per_mem,
            cost_per_storage: config.cost_per_storage,
            cost_per_bw: config.cost_per_bw,
        };
        Self::new(config.name.clone(), characteristics, hosts)
    }

    /// Places `vm` on the host with the most free MIPS, preferring hosts that
    /// can hold it entirely. Ties go to the lowest host id. A VM that fits
    /// nowhere is still placed and the placement is flagged.
    pub fn allocate_vm(&mut self, vm: &Vm) -> Placement {
        let pick = |hosts: &[Host], only_fitting: bool| {
            hosts
                .iter()
                .filter(|host| !only_fitting || host.can_host(vm))
                .fold(None::<&Host>, |best, host| match best {
                    Some(b) if b.free_mips() >= host.free_mips() => Some(b),
                    _ => Some(host),
                })
                .map(|host| host.id)
        };
        let (host_id, fits) = match pick(&self.hosts, true) {
            Some(id) => (id, true),
            // hosts is never empty, see `Datacenter::new`
            None => (pick(&self.hosts, false).unwrap_or(0), false),
        };

        let host = &mut self.hosts[host_id as usize];
        host.attach(vm);
        debug!("Placed vm {} on host {} (fits: {})", vm.id, host_id, fits);
        Placement {
            host: host_id,
            oversubscribed: !fits,
        }
    }

    pub fn deallocate_vm(&mut self, vm: &Vm) {
        if let Some(host_id) = vm.host {
            if let Some(host) = self.hosts.get_mut(host_id as usize) {
                host.detach(vm);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatacenterConfig;
    use crate::model::vm::SchedulerDiscipline;

    fn vm(id: VmId, mips: f64, ram: u64) -> Vm {
        Vm::new(id, mips, 1, ram, 1000, 10_000, "Xen", SchedulerDiscipline::SpaceShared)
    }

    fn two_host_datacenter() -> Datacenter {
        let mut config = DatacenterConfig::default();
        config.hosts[0].count = 2;
        config.hosts[0].pes = 4;
        Datacenter::from_config(&config).unwrap()
    }

    #[test]
    fn places_on_host_with_most_free_mips() {
        let mut dc = two_host_datacenter();
        let first = dc.allocate_vm(&vm(0, 1000.0, 512));
        let second = dc.allocate_vm(&vm(1, 1000.0, 512));
        assert_eq!(first, Placement { host: 0, oversubscribed: false });
        assert_eq!(second, Placement { host: 1, oversubscribed: false });
        assert_eq!(dc.hosts[0].vms, vec![0]);
        assert_eq!(dc.hosts[1].vms, vec![1]);
    }

    #[test]
    fn reports_oversubscription_instead_of_refusing() {
        let mut dc = Datacenter::from_config(&DatacenterConfig::default()).unwrap();
        let fast = vm(0, 1500.0, 512);
        let placement = dc.allocate_vm(&fast);
        assert!(placement.oversubscribed);
        assert!(dc.hosts[0].is_oversubscribed());

        let mut fast = fast;
        fast.host = Some(placement.host);
        dc.deallocate_vm(&fast);
        assert!(!dc.hosts[0].is_oversubscribed());
        assert!(dc.hosts[0].vms.is_empty());
    }

    #[test]
    fn ram_counts_towards_fit() {
        let mut dc = Datacenter::from_config(&DatacenterConfig::default()).unwrap();
        assert!(dc.allocate_vm(&vm(0, 500.0, 4096)).oversubscribed);
    }

    #[test]
    fn huge_vms_saturate_instead_of_overflowing() {
        let mut dc = Datacenter::from_config(&DatacenterConfig::default()).unwrap();
        assert!(dc.allocate_vm(&vm(0, 500.0, 1 << 63)).oversubscribed);
        assert!(dc.allocate_vm(&vm(1, 500.0, 1 << 63)).oversubscribed);
        assert_eq!(dc.hosts[0].used_ram, u64::MAX);
        assert_eq!(dc.hosts[0].vms, vec![0, 1]);
    }

    #[test]
    fn rejects_empty_host_set() {
        let mut config = DatacenterConfig::default();
        config.hosts[0].count = 0;
        assert!(matches!(
            Datacenter::from_config(&config),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn resource_cost_uses_characteristics() {
        let dc = Datacenter::from_config(&DatacenterConfig::default()).unwrap();
        let cost = dc.characteristics.vm_resource_cost(&vm(0, 1000.0, 512));
        assert!((cost - (0.05 * 512.0 + 0.001 * 10_000.0)).abs() < 1e-9);
    }
}
