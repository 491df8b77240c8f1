use serde::{Deserialize, Serialize};

use super::vm::VmId;

pub type CloudletId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudletState {
    Created,
    /// Assigned to a VM, waiting for free PEs.
    Queued,
    Running,
    Finished,
    Failed,
}

impl CloudletState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CloudletState::Finished | CloudletState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct Cloudlet {
    pub id: CloudletId,
    /// Length in millions of instructions.
    pub length: u64,
    pub pes: u32,
    pub file_size: u64,
    pub output_size: u64,
    pub vm: Option<VmId>,
    pub state: CloudletState,
    pub submission_time: f64,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
    /// Times the cloudlet was re-queued after failing to fit.
    pub retries: u32,

    // Progress bookkeeping, owned by the engine.
    pub(crate) remaining: f64,
    pub(crate) rate: f64,
    pub(crate) last_progress: f64,
}

impl Cloudlet {
    pub fn new(id: CloudletId, length: u64, pes: u32, file_size: u64, output_size: u64) -> Self {
        Self {
            id,
            length,
            pes,
            file_size,
            output_size,
            vm: None,
            state: CloudletState::Created,
            submission_time: 0.0,
            start_time: None,
            finish_time: None,
            retries: 0,
            remaining: length as f64,
            rate: 0.0,
            last_progress: 0.0,
        }
    }

    pub fn with_submission_time(mut self, time: f64) -> Self {
        self.submission_time = time;
        self
    }

    /// Instructions left to execute, including the contention overhead.
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Time from start to finish.
    pub fn execution_time(&self) -> Option<f64> {
        match (self.start_time, self.finish_time) {
            (Some(start), Some(finish)) => Some(finish - start),
            _ => None,
        }
    }

    /// Time from submission to finish.
    pub fn response_time(&self) -> Option<f64> {
        self.finish_time.map(|finish| finish - self.submission_time)
    }
}
