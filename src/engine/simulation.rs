use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::SimulationError;
use crate::model::{
    Cloudlet, CloudletId, CloudletState, Datacenter, HostId, Scenario, SchedulerDiscipline, Vm,
    VmId,
};
use crate::scheduler::AllocationPolicy;
use super::event::{Event, EventId, EventKind, TraceEntry};

/// Epsilon to compare floating point timestamps.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Initialized,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub max_retries: u32,
    pub time_limit: Option<Duration>,
}

/// A placement decision taken by the allocation policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub time: f64,
    pub cloudlet: CloudletId,
    pub vm: VmId,
}

/// Everything left once a run has stopped.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub name: String,
    pub clock: f64,
    pub datacenter: Datacenter,
    pub vms: Vec<Vm>,
    pub cloudlets: Vec<Cloudlet>,
    pub assignments: Vec<Assignment>,
    pub trace: Vec<TraceEntry>,
    pub oversubscribed_hosts: BTreeSet<HostId>,
    pub processed_events: u64,
}

impl SimulationOutcome {
    pub fn finished(&self) -> impl Iterator<Item = &Cloudlet> {
        self.cloudlets.iter().filter(|c| c.state == CloudletState::Finished)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Cloudlet> {
        self.cloudlets.iter().filter(|c| c.state == CloudletState::Failed)
    }
}

/// Per-run simulation context: clock, event queue and resource tables.
pub struct Simulation {
    name: String,
    state: SimulationState,
    clock: f64,
    events: BinaryHeap<Event>,
    canceled_events: HashSet<EventId>,
    next_event_id: EventId,
    processed_events: u64,
    finish_events: HashMap<CloudletId, EventId>,

    datacenter: Datacenter,
    vms: Vec<Vm>,
    cloudlets: Vec<Cloudlet>,
    overhead_factor: f64,
    policy: Box<dyn AllocationPolicy>,
    options: EngineOptions,

    unfinished: usize,
    retry_pool: BTreeSet<CloudletId>,
    stopping: bool,

    assignments: Vec<Assignment>,
    trace: Vec<TraceEntry>,
    oversubscribed_hosts: BTreeSet<HostId>,
}

impl Simulation {
    pub fn new(
        name: impl Into<String>,
        scenario: Scenario,
        policy: Box<dyn AllocationPolicy>,
        options: EngineOptions,
    ) -> Result<Self, SimulationError> {
        let Scenario {
            datacenter,
            vms,
            cloudlets,
            overhead_factor,
        } = scenario;
        if vms.iter().enumerate().any(|(index, vm)| vm.id as usize != index) {
            return Err(SimulationError::invalid("vm ids must match their position"));
        }
        if cloudlets.iter().enumerate().any(|(index, c)| c.id as usize != index) {
            return Err(SimulationError::invalid("cloudlet ids must match their position"));
        }
        if let Some(c) = cloudlets.iter().find(|c| c.length == 0 || c.pes == 0) {
            return Err(SimulationError::invalid(format!("cloudlet {} has no work", c.id)));
        }
        if let Some(c) = cloudlets.iter().find(|c| vms.iter().any(|vm| c.pes > vm.pes)) {
            return Err(SimulationError::invalid(format!(
                "cloudlet {} needs {} pes, more than some vm has",
                c.id, c.pes
            )));
        }
        if !(overhead_factor.is_finite() && overhead_factor > 0.0) {
            return Err(SimulationError::invalid("overhead factor must be positive"));
        }

        Ok(Self {
            name: name.into(),
            state: SimulationState::Initialized,
            clock: 0.0,
            events: BinaryHeap::new(),
            canceled_events: HashSet::new(),
            next_event_id: 0,
            processed_events: 0,
            finish_events: HashMap::new(),
            datacenter,
            vms,
            unfinished: cloudlets.len(),
            cloudlets,
            overhead_factor,
            policy,
            options,
            retry_pool: BTreeSet::new(),
            stopping: false,
            assignments: Vec::new(),
            trace: Vec::new(),
            oversubscribed_hosts: BTreeSet::new(),
        })
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    /// Runs until the event queue drains or the time limit is hit.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        // A limit too far out to represent is no limit at all.
        let deadline = self
            .options
            .time_limit
            .and_then(|limit| Instant::now().checked_add(limit).map(|at| (at, limit)));
        loop {
            if let Some((deadline, limit)) = deadline {
                if Instant::now() >= deadline {
                    warn!("Simulation {} aborted at time {:.3}", self.name, self.clock);
                    return Err(SimulationError::Timeout {
                        strategy: self.name.clone(),
                        limit_seconds: limit.as_secs_f64(),
                    });
                }
            }
            if !self.step() {
                return Ok(());
            }
        }
    }

    /// Processes one event. Returns `false` once the simulation has stopped.
    pub fn step(&mut self) -> bool {
        match self.state {
            SimulationState::Stopped => return false,
            SimulationState::Initialized => self.seed(),
            SimulationState::Running => {}
        }
        while let Some(event) = self.events.pop() {
            if self.canceled_events.remove(&event.id) {
                continue;
            }
            self.process(event);
            return true;
        }
        self.state = SimulationState::Stopped;
        info!(
            "Simulation {} stopped at time {:.3} after {} events",
            self.name, self.clock, self.processed_events
        );
        false
    }

    pub fn into_outcome(self) -> SimulationOutcome {
        SimulationOutcome {
            name: self.name,
            clock: self.clock,
            datacenter: self.datacenter,
            vms: self.vms,
            cloudlets: self.cloudlets,
            assignments: self.assignments,
            trace: self.trace,
            oversubscribed_hosts: self.oversubscribed_hosts,
            processed_events: self.processed_events,
        }
    }

    fn seed(&mut self) {
        info!(
            "Simulation {} started with {} vms and {} cloudlets",
            self.name,
            self.vms.len(),
            self.cloudlets.len()
        );
        self.state = SimulationState::Running;
        for vm in 0..self.vms.len() {
            self.emit(0.0, EventKind::VmStart { vm: vm as VmId });
        }
        for index in 0..self.cloudlets.len() {
            let cloudlet = &mut self.cloudlets[index];
            cloudlet.remaining = cloudlet.length as f64 * self.overhead_factor;
            let time = cloudlet.submission_time;
            self.emit(time, EventKind::CloudletArrival { cloudlet: index as CloudletId });
        }
    }

    fn emit(&mut self, time: f64, kind: EventKind) -> EventId {
        assert!(
            time >= self.clock - EPSILON,
            "Event {:?} scheduled in the past ({} < {})",
            kind,
            time,
            self.clock
        );
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.events.push(Event {
            id,
            time: time.max(self.clock),
            kind,
        });
        id
    }

    fn process(&mut self, event: Event) {
        self.clock = event.time;
        self.processed_events += 1;
        self.trace.push(TraceEntry {
            time: event.time,
            kind: event.kind,
        });
        debug!("t={:.6} {:?}", self.clock, event.kind);

        match event.kind {
            EventKind::VmStart { vm } => self.on_vm_start(vm),
            EventKind::CloudletArrival { cloudlet } => self.on_cloudlet_arrival(cloudlet),
            EventKind::CloudletFinish { cloudlet } => self.on_cloudlet_finish(cloudlet),
            EventKind::VmStop { vm } => self.on_vm_stop(vm),
        }
        self.check_completion();
    }

    fn on_vm_start(&mut self, vm_id: VmId) {
        let vm = &mut self.vms[vm_id as usize];
        let placement = self.datacenter.allocate_vm(vm);
        vm.start(placement.host, self.clock);
        if placement.oversubscribed {
            warn!("Host {} capacity exceeded by vm {}", placement.host, vm_id);
            self.oversubscribed_hosts.insert(placement.host);
        }
    }

    fn on_cloudlet_arrival(&mut self, cloudlet_id: CloudletId) {
        let cloudlet = &self.cloudlets[cloudlet_id as usize];
        assert_eq!(
            cloudlet.state,
            CloudletState::Created,
            "Cloudlet {} arrived while {:?}",
            cloudlet_id,
            cloudlet.state
        );
        match self.policy.assign(cloudlet, &self.vms) {
            Some(vm_id) => {
                assert!(
                    self.vms.get(vm_id as usize).map_or(false, Vm::is_available),
                    "Policy picked unavailable vm {}",
                    vm_id
                );
                self.assignments.push(Assignment {
                    time: self.clock,
                    cloudlet: cloudlet_id,
                    vm: vm_id,
                });
                self.submit(cloudlet_id, vm_id);
            }
            None => self.fail(cloudlet_id),
        }
    }

    fn submit(&mut self, cloudlet_id: CloudletId, vm_id: VmId) {
        let cloudlet = &mut self.cloudlets[cloudlet_id as usize];
        let vm = &mut self.vms[vm_id as usize];
        cloudlet.vm = Some(vm_id);
        vm.assigned_length += cloudlet.length;

        let discipline = vm.discipline;
        match discipline {
            SchedulerDiscipline::SpaceShared => {
                if vm.free_pes() >= cloudlet.pes && vm.waiting.is_empty() {
                    self.start_exclusive(cloudlet_id, vm_id);
                } else {
                    cloudlet.state = CloudletState::Queued;
                    vm.waiting.push_back(cloudlet_id);
                    debug!("Cloudlet {} queued on vm {}", cloudlet_id, vm_id);
                }
            }
            SchedulerDiscipline::TimeShared => {
                self.advance_shared(vm_id);
                let clock = self.clock;
                let cloudlet = &mut self.cloudlets[cloudlet_id as usize];
                let vm = &mut self.vms[vm_id as usize];
                vm.update_occupancy(clock);
                vm.requested_pes += cloudlet.pes;
                vm.running.push(cloudlet_id);
                cloudlet.state = CloudletState::Running;
                cloudlet.start_time = Some(clock);
                cloudlet.last_progress = clock;
                self.reschedule_shared(vm_id);
            }
        }
    }

    /// Space-shared start: the cloudlet holds its PEs until it finishes.
    fn start_exclusive(&mut self, cloudlet_id: CloudletId, vm_id: VmId) {
        let clock = self.clock;
        let cloudlet = &mut self.cloudlets[cloudlet_id as usize];
        let vm = &mut self.vms[vm_id as usize];
        vm.update_occupancy(clock);
        vm.requested_pes += cloudlet.pes;
        vm.running.push(cloudlet_id);
        cloudlet.state = CloudletState::Running;
        cloudlet.start_time = Some(clock);
        cloudlet.last_progress = clock;
        cloudlet.rate = vm.mips * cloudlet.pes as f64;
        let finish = clock + cloudlet.remaining / cloudlet.rate;

        let event_id = self.emit(finish, EventKind::CloudletFinish { cloudlet: cloudlet_id });
        self.finish_events.insert(cloudlet_id, event_id);
    }

    /// Charges progress made at the current rates up to now.
    fn advance_shared(&mut self, vm_id: VmId) {
        let clock = self.clock;
        for &id in &self.vms[vm_id as usize].running {
            let cloudlet = &mut self.cloudlets[id as usize];
            let done = cloudlet.rate * (clock - cloudlet.last_progress);
            cloudlet.remaining = (cloudlet.remaining - done).max(0.0);
            cloudlet.last_progress = clock;
        }
    }

    /// Splits the VM's rate between its running cloudlets and moves their
    /// finish events accordingly.
    fn reschedule_shared(&mut self, vm_id: VmId) {
        let clock = self.clock;
        let vm = &self.vms[vm_id as usize];
        let share = if vm.requested_pes > vm.pes {
            vm.pes as f64 / vm.requested_pes as f64
        } else {
            1.0
        };
        let mut finishes = Vec::with_capacity(vm.running.len());
        for &id in &vm.running {
            let cloudlet = &mut self.cloudlets[id as usize];
            cloudlet.rate = vm.mips * cloudlet.pes as f64 * share;
            finishes.push((id, clock + cloudlet.remaining / cloudlet.rate));
        }
        for (id, finish) in finishes {
            if let Some(stale) = self.finish_events.remove(&id) {
                self.canceled_events.insert(stale);
            }
            let event_id = self.emit(finish, EventKind::CloudletFinish { cloudlet: id });
            self.finish_events.insert(id, event_id);
        }
    }

    fn on_cloudlet_finish(&mut self, cloudlet_id: CloudletId) {
        let clock = self.clock;
        let cloudlet = &self.cloudlets[cloudlet_id as usize];
        assert_eq!(
            cloudlet.state,
            CloudletState::Running,
            "Got finish event for cloudlet {} in state {:?}",
            cloudlet_id,
            cloudlet.state
        );
        let Some(vm_id) = cloudlet.vm else {
            panic!("Running cloudlet {} has no vm", cloudlet_id);
        };
        self.finish_events.remove(&cloudlet_id);

        let discipline = self.vms[vm_id as usize].discipline;
        if discipline == SchedulerDiscipline::TimeShared {
            self.advance_shared(vm_id);
        }

        let cloudlet = &mut self.cloudlets[cloudlet_id as usize];
        let vm = &mut self.vms[vm_id as usize];
        vm.update_occupancy(clock);
        vm.running.retain(|&id| id != cloudlet_id);
        vm.requested_pes -= cloudlet.pes;
        vm.assigned_length -= cloudlet.length;
        cloudlet.state = CloudletState::Finished;
        cloudlet.finish_time = Some(clock);
        cloudlet.remaining = 0.0;
        cloudlet.rate = 0.0;
        let freed_pes = cloudlet.pes;
        self.unfinished -= 1;
        debug!("Cloudlet {} finished on vm {} at {:.6}", cloudlet_id, vm_id, clock);

        match discipline {
            SchedulerDiscipline::SpaceShared => self.start_waiting(vm_id),
            SchedulerDiscipline::TimeShared => self.reschedule_shared(vm_id),
        }
        if self.policy.requeues_on_release() {
            self.requeue_failed(freed_pes);
        }
    }

    fn start_waiting(&mut self, vm_id: VmId) {
        loop {
            let vm = &self.vms[vm_id as usize];
            let Some(&next) = vm.waiting.front() else {
                break;
            };
            if vm.free_pes() < self.cloudlets[next as usize].pes {
                break;
            }
            self.vms[vm_id as usize].waiting.pop_front();
            self.start_exclusive(next, vm_id);
        }
    }

    fn fail(&mut self, cloudlet_id: CloudletId) {
        let cloudlet = &mut self.cloudlets[cloudlet_id as usize];
        cloudlet.state = CloudletState::Failed;
        cloudlet.vm = None;
        self.unfinished -= 1;
        if self.policy.requeues_on_release() && cloudlet.retries < self.options.max_retries {
            debug!("Cloudlet {} does not fit, waiting for capacity", cloudlet_id);
            self.retry_pool.insert(cloudlet_id);
        } else {
            warn!("Cloudlet {} failed: no vm can take it", cloudlet_id);
        }
    }

    /// Gives failed cloudlets, lowest id first, another arrival while their PE
    /// demand fits in what was just released. At least one is re-queued.
    fn requeue_failed(&mut self, freed_pes: u32) {
        let mut budget = freed_pes;
        let mut requeued = Vec::new();
        for &id in &self.retry_pool {
            let pes = self.cloudlets[id as usize].pes;
            if !requeued.is_empty() && pes > budget {
                break;
            }
            budget = budget.saturating_sub(pes);
            requeued.push(id);
        }
        for id in requeued {
            self.retry_pool.remove(&id);
            let cloudlet = &mut self.cloudlets[id as usize];
            cloudlet.state = CloudletState::Created;
            cloudlet.retries += 1;
            self.unfinished += 1;
            debug!("Re-queuing cloudlet {} (retry {})", id, cloudlet.retries);
            self.emit(self.clock, EventKind::CloudletArrival { cloudlet: id });
        }
    }

    fn on_vm_stop(&mut self, vm_id: VmId) {
        let vm = &mut self.vms[vm_id as usize];
        assert!(
            vm.running.is_empty() && vm.waiting.is_empty(),
            "Stopping vm {} with cloudlets still assigned",
            vm_id
        );
        vm.stop(self.clock);
        self.datacenter.deallocate_vm(vm);
    }

    fn check_completion(&mut self) {
        if self.unfinished > 0 || self.stopping {
            return;
        }
        self.stopping = true;
        if !self.retry_pool.is_empty() {
            warn!(
                "{} cloudlets failed with no capacity left to retry on",
                self.retry_pool.len()
            );
        }
        for index in 0..self.vms.len() {
            if self.vms[index].is_available() {
                self.emit(self.clock, EventKind::VmStop { vm: index as VmId });
            }
        }
    }
}
