use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::cloudlet::CloudletId;
use super::host::HostId;

pub type VmId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerDiscipline {
    /// Capacity is split between all co-resident cloudlets.
    TimeShared,
    /// Each cloudlet holds its PEs exclusively; the rest wait in FIFO order.
    SpaceShared,
}

#[derive(Debug, Clone)]
pub struct Vm {
    pub id: VmId,
    pub host: Option<HostId>,
    /// Rate of a single PE.
    pub mips: f64,
    pub pes: u32,
    pub ram: u64,
    pub bw: u64,
    pub size: u64,
    pub vmm: String,
    pub discipline: SchedulerDiscipline,

    pub running: Vec<CloudletId>,
    pub waiting: VecDeque<CloudletId>,
    /// PEs requested by running cloudlets. May exceed `pes` when time-shared.
    pub requested_pes: u32,
    /// Sum of lengths of assigned, unfinished cloudlets.
    pub assigned_length: u64,

    pub started_at: Option<f64>,
    pub stopped_at: Option<f64>,
    pub busy_pe_seconds: f64,
    last_occupancy_update: f64,
}

impl Vm {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: VmId,
        mips: f64,
        pes: u32,
        ram: u64,
        bw: u64,
        size: u64,
        vmm: &str,
        discipline: SchedulerDiscipline,
    ) -> Self {
        Self {
            id,
            host: None,
            mips,
            pes,
            ram,
            bw,
            size,
            vmm: vmm.to_string(),
            discipline,
            running: Vec::new(),
            waiting: VecDeque::new(),
            requested_pes: 0,
            assigned_length: 0,
            started_at: None,
            stopped_at: None,
            busy_pe_seconds: 0.0,
            last_occupancy_update: 0.0,
        }
    }

    /// Total processing rate over all PEs.
    pub fn capacity(&self) -> f64 {
        self.mips * self.pes as f64
    }

    pub fn free_pes(&self) -> u32 {
        self.pes.saturating_sub(self.requested_pes)
    }

    pub fn free_mips(&self) -> f64 {
        self.free_pes() as f64 * self.mips
    }

    pub fn busy_pes(&self) -> u32 {
        self.requested_pes.min(self.pes)
    }

    /// Started and not yet stopped.
    pub fn is_available(&self) -> bool {
        self.started_at.is_some() && self.stopped_at.is_none()
    }

    /// Accumulates busy PE-seconds up to `now`. Must be called before the set
    /// of running cloudlets changes.
    pub fn update_occupancy(&mut self, now: f64) {
        let elapsed = now - self.last_occupancy_update;
        if elapsed > 0.0 {
            self.busy_pe_seconds += self.busy_pes() as f64 * elapsed;
        }
        self.last_occupancy_update = now;
    }

    pub fn start(&mut self, host: HostId, now: f64) {
        self.host = Some(host);
        self.started_at = Some(now);
        self.last_occupancy_update = now;
    }

    pub fn stop(&mut self, now: f64) {
        self.update_occupancy(now);
        self.stopped_at = Some(now);
    }

    /// Fraction of PE time spent busy over `[0, horizon]`.
    pub fn utilization(&self, horizon: f64) -> f64 {
        if horizon > 0.0 {
            (self.busy_pe_seconds / (self.pes as f64 * horizon)).min(1.0)
        } else {
            0.0
        }
    }
}
