//! Thread-safe scheduler handle
//!
//! Mutations are serialized through a single writer lock. After each
//! successful mutation the resulting [`BoardView`] is published behind an
//! `Arc`, so readers never wait on a writer and never see a half-applied
//! change.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::scheduler::{BoardView, Command, Outcome, SchedulerError, Snapshot, TaskScheduler};

#[derive(Debug)]
pub struct SharedScheduler {
    writer: Mutex<TaskScheduler>,
    latest: RwLock<Arc<BoardView>>,
}

impl SharedScheduler {
    pub fn new(scheduler: TaskScheduler) -> Self {
        let view = Arc::new(scheduler.view());
        Self {
            writer: Mutex::new(scheduler),
            latest: RwLock::new(view),
        }
    }

    /// Applies a command and publishes the new view
    ///
    /// A failed command publishes nothing.
    pub fn execute(&self, command: Command) -> Result<Outcome, SchedulerError> {
        let mut scheduler = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = scheduler.apply(command)?;

        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = Arc::new(outcome.view.clone());
        Ok(outcome)
    }

    /// The most recently published view
    pub fn view(&self) -> Arc<BoardView> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persistable state as of the last committed mutation
    pub fn snapshot(&self) -> Snapshot {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn into_inner(self) -> TaskScheduler {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
