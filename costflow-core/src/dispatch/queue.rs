//! Outbound queue contract

use super::job::RecalcJob;
use super::recalculator::Recalculator;
use crate::core::{DispatchError, RecalcError};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Accepts recalculation units for asynchronous, at-least-once execution
pub trait RecalcQueue: Send + Sync {
    fn enqueue(&self, job: RecalcJob) -> Result<(), DispatchError>;
}

/// FIFO that only records jobs; drained explicitly by tests and tools
#[derive(Default)]
pub struct RecordingQueue {
    pending: Mutex<VecDeque<RecalcJob>>,
    closed: Mutex<bool>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending jobs in enqueue order
    pub fn jobs(&self) -> Vec<RecalcJob> {
        self.pending.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Take every pending job
    pub fn drain(&self) -> Vec<RecalcJob> {
        self.pending.lock().drain(..).collect()
    }

    /// Refuse further jobs with [`DispatchError::Closed`]
    pub fn close(&self) {
        *self.closed.lock() = true;
    }

    /// Execute jobs one at a time until none are left, including the
    /// follow-up jobs they enqueue; returns how many ran
    ///
    /// Stops at the first failure, leaving the failed job dropped and the
    /// rest still pending.
    pub fn run_until_empty(&self, recalculator: &Recalculator) -> Result<usize, RecalcError> {
        let mut executed = 0;
        loop {
            // Lock released before executing; the unit may enqueue more work
            let next = self.pending.lock().pop_front();
            let Some(job) = next else {
                return Ok(executed);
            };
            recalculator.execute(job, self)?;
            executed += 1;
        }
    }
}

impl RecalcQueue for RecordingQueue {
    fn enqueue(&self, job: RecalcJob) -> Result<(), DispatchError> {
        if *self.closed.lock() {
            return Err(DispatchError::Closed);
        }
        self.pending.lock().push_back(job);
        Ok(())
    }
}
