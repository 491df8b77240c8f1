use std::cmp::Ordering;

use crate::model::{CloudletId, VmId};

pub type EventId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    VmStart { vm: VmId },
    CloudletArrival { cloudlet: CloudletId },
    CloudletFinish { cloudlet: CloudletId },
    VmStop { vm: VmId },
}

impl EventKind {
    /// Processing order among events with equal timestamps; lower goes first.
    pub fn priority(&self) -> u8 {
        match self {
            EventKind::VmStart { .. } => 0,
            EventKind::CloudletArrival { .. } => 1,
            EventKind::CloudletFinish { .. } => 2,
            EventKind::VmStop { .. } => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub time: f64,
    pub kind: EventKind,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Reversed so that `BinaryHeap` pops the earliest event first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.kind.priority().cmp(&self.kind.priority()))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A processed event, in processing order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEntry {
    pub time: f64,
    pub kind: EventKind,
}
