//! Single-slot handoff from the pollers to the worker.
//!
//! The slot only ever holds the latest schedule and the latest task set.
//! Intermediate states offered between two `begin_work` calls are lost.
//!
//! Unlike a plain "snapshot whenever both halves are present" slot, a picture
//! is handed out once per offer: after a snapshot, `begin_work` waits for a
//! new schedule or task set even if the current one is complete. The worker
//! would skip an unchanged picture anyway, since its keys are already marked
//! processed for the epoch.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::model::{FlicaTask, Schedule};

/// What the worker optimizes against in one cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub schedule: Arc<Schedule>,
    pub tasks: Vec<FlicaTask>,
}

#[derive(Debug, Default)]
struct Slot {
    schedule: Option<Arc<Schedule>>,
    tasks: Vec<FlicaTask>,
    /// Bumped on every offer.
    generation: u64,
    /// Generation handed out by the last `begin_work`.
    consumed: u64,
}

impl Slot {
    fn ready(&self) -> bool {
        self.schedule.is_some() && !self.tasks.is_empty() && self.generation > self.consumed
    }

    fn take(&mut self) -> Option<Snapshot> {
        if !self.ready() {
            return None;
        }
        self.consumed = self.generation;
        let schedule = self.schedule.clone()?;
        Some(Snapshot {
            schedule,
            tasks: self.tasks.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct Collector {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn offer_schedule(&self, schedule: Arc<Schedule>) {
        let mut slot = self.lock();
        slot.schedule = Some(schedule);
        slot.generation += 1;
        self.changed.notify_all();
    }

    pub fn offer_tasks(&self, tasks: Vec<FlicaTask>) {
        let mut slot = self.lock();
        slot.tasks = tasks;
        slot.generation += 1;
        self.changed.notify_all();
    }

    /// Blocks until a schedule and a non-empty task set are both present and
    /// something has been offered since the previous snapshot. A complete but
    /// unchanged picture does not release it.
    pub fn begin_work(&self) -> Snapshot {
        let mut slot = self.lock();
        loop {
            if let Some(snapshot) = slot.take() {
                return snapshot;
            }
            slot = match self.changed.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Non-blocking.
    pub fn try_begin_work(&self) -> Option<Snapshot> {
        self.lock().take()
    }
}
