//! Predicates that prune the solver's search space.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::config::BidConfig;
use crate::model::{PairingKey, Schedule};
use crate::proposal::TaskWrapper;

/// Decides which subsets of held trips may be retained.
#[derive(Debug, Clone)]
pub struct ScheduleFilter {
    undroppable: BTreeSet<PairingKey>,
    forced_drops: BTreeSet<PairingKey>,
    minimum_retained_trips: usize,
}

impl ScheduleFilter {
    pub fn new(schedule: &Schedule, config: &BidConfig, today: NaiveDate) -> Self {
        Self {
            undroppable: schedule.undroppable_keys(today),
            forced_drops: config.forced_drops.iter().cloned().collect(),
            minimum_retained_trips: config.minimum_retained_trips,
        }
    }

    pub fn must_retain(&self, key: &PairingKey) -> bool {
        self.undroppable.contains(key)
    }

    pub fn must_drop(&self, key: &PairingKey) -> bool {
        self.forced_drops.contains(key)
    }

    pub fn test(&self, retained: &BTreeSet<PairingKey>) -> bool {
        retained.is_superset(&self.undroppable)
            && retained.is_disjoint(&self.forced_drops)
            && retained.len() >= self.minimum_retained_trips
    }
}

/// Decides which opentime tasks may be combined into one swap.
#[derive(Debug, Clone, Copy)]
pub struct TaskFilter {
    max_adds: usize,
}

impl TaskFilter {
    /// Never more adds than the swap drops.
    pub fn new(config: &BidConfig, num_drops: usize) -> Self {
        Self {
            max_adds: config.max_adds_per_swap.min(num_drops),
        }
    }

    pub fn max_adds(&self) -> usize {
        self.max_adds
    }

    /// Whether `next` can join `chosen`.
    pub fn admits(&self, chosen: &[&TaskWrapper], next: &TaskWrapper) -> bool {
        chosen.len() < self.max_adds && chosen.iter().all(|t| t.dates().is_disjoint(next.dates()))
    }

    pub fn test(&self, tasks: &[&TaskWrapper]) -> bool {
        !tasks.is_empty()
            && tasks.len() <= self.max_adds
            && tasks
                .iter()
                .enumerate()
                .all(|(i, a)| tasks[i + 1..].iter().all(|b| a.dates().is_disjoint(b.dates())))
    }
}
