//! Counters reported by the worker and pollers.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;

use crate::model::SwapStatus;
use crate::transition::Transition;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub solutions: u64,
    pub submitted: u64,
    pub duplicates: u64,
    pub failures: u64,
    pub skipped_transitions: u64,
    pub opentime_refreshes: u64,
    pub last_opentime_refresh: Option<NaiveDateTime>,
    pub swaps: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: StatsSnapshot,
    recorded: HashSet<Transition>,
}

#[derive(Debug, Default)]
pub struct RuntimeStats {
    inner: Mutex<Inner>,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record_cycle(&self, num_solutions: usize) {
        let mut inner = self.lock();
        inner.snapshot.cycles += 1;
        inner.snapshot.solutions += num_solutions as u64;
    }

    pub fn record_skipped_cycle(&self) {
        self.lock().snapshot.skipped_cycles += 1;
    }

    /// Counts a submission outcome. Returns false, counting nothing, if this
    /// transition was already recorded.
    pub fn record_submission(&self, transition: &Transition, status: SwapStatus) -> bool {
        let mut inner = self.lock();
        if !inner.recorded.insert(transition.clone()) {
            return false;
        }
        match status {
            SwapStatus::Success => {
                inner.snapshot.submitted += 1;
                inner.snapshot.swaps.push(transition.to_string());
            }
            SwapStatus::Duplicate => inner.snapshot.duplicates += 1,
        }
        true
    }

    pub fn record_failure(&self) {
        self.lock().snapshot.failures += 1;
    }

    pub fn record_skipped_transition(&self) {
        self.lock().snapshot.skipped_transitions += 1;
    }

    pub fn record_opentime_refresh(&self, at: NaiveDateTime) {
        let mut inner = self.lock();
        inner.snapshot.opentime_refreshes += 1;
        inner.snapshot.last_opentime_refresh = Some(at);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().snapshot.clone()
    }
}

impl fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot();
        writeln!(
            f,
            "{} cycles ({} skipped), {} solutions",
            s.cycles, s.skipped_cycles, s.solutions
        )?;
        writeln!(
            f,
            "{} swaps submitted, {} duplicate, {} failed, {} skipped",
            s.submitted, s.duplicates, s.failures, s.skipped_transitions
        )?;
        match s.last_opentime_refresh {
            Some(at) => writeln!(f, "{} opentime refreshes (last {})", s.opentime_refreshes, at)?,
            None => writeln!(f, "{} opentime refreshes (last none)", s.opentime_refreshes)?,
        }
        for swap in &s.swaps {
            writeln!(f, "{}", swap)?;
        }
        Ok(())
    }
}
