//! Replay outcome reporting.
//!
//! Seeks return before their replay task runs, so task results travel back
//! through a drain queue the caller polls. Errors never unwind the executor
//! thread.

use std::sync::Mutex;

use crate::replay::ReplayError;

/// The seek that triggered a replay task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekRequest {
    Frame { target: usize },
    Command { frame: usize, target: usize },
}

/// Result of one replay task, in task completion order.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub request: SeekRequest,
    pub result: Result<(), ReplayError>,
}

#[derive(Debug, Default)]
pub(crate) struct OutcomeQueue {
    inner: Mutex<Vec<ReplayOutcome>>,
}

impl OutcomeQueue {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReplayOutcome>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn push(&self, outcome: ReplayOutcome) {
        self.lock().push(outcome);
    }

    pub(crate) fn drain(&self) -> Vec<ReplayOutcome> {
        std::mem::take(&mut *self.lock())
    }
}
