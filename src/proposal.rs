//! Candidate schedule shapes built by the solver.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::calendar::{self, Interval, Period};
use crate::config::{BidConfig, ScoringConfig};
use crate::error::BidError;
use crate::model::{FlicaTask, PairingKey, Schedule, Trip};
use crate::score::TripScore;
use crate::transition::Transition;

/// An opentime task resolved to its full trip.
#[derive(Debug, Clone)]
pub struct TaskWrapper {
    task: FlicaTask,
    key: PairingKey,
    dates: BTreeSet<NaiveDate>,
    trip: Arc<Trip>,
    score: i64,
}

impl TaskWrapper {
    pub fn new(task: FlicaTask, trip: Arc<Trip>, scoring: &ScoringConfig) -> Self {
        let key = task.pairing_key();
        let dates = task.dates();
        let trip_score = TripScore::new(&trip, scoring);
        debug!(task = %key, explanation = ?trip_score.explanation(), "scored opentime trip");
        let score = trip_score.points();
        Self {
            task,
            key,
            dates,
            trip,
            score,
        }
    }

    pub fn task(&self) -> &FlicaTask {
        &self.task
    }

    pub fn key(&self) -> &PairingKey {
        &self.key
    }

    pub fn dates(&self) -> &BTreeSet<NaiveDate> {
        &self.dates
    }

    pub fn trip(&self) -> &Arc<Trip> {
        &self.trip
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn credit(&self) -> Period {
        self.task.credit
    }

    pub fn num_days(&self) -> usize {
        self.dates.len()
    }
}

impl PartialEq for TaskWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TaskWrapper {}

/// The schedule with only `retained_keys` kept.
#[derive(Debug)]
pub struct ReducedSchedule {
    schedule: Arc<Schedule>,
    retained_keys: BTreeSet<PairingKey>,
    drop_keys: BTreeSet<PairingKey>,
    credit: Period,
    score: i64,
    num_working_days: usize,
    original_num_working_days: usize,
}

impl ReducedSchedule {
    /// `trip_scores` must hold a score for every retained key.
    pub fn new(
        schedule: Arc<Schedule>,
        retained_keys: BTreeSet<PairingKey>,
        trip_scores: &BTreeMap<PairingKey, i64>,
    ) -> Result<Self, BidError> {
        let credits = schedule.trip_credit_in_month();
        let work_days = schedule.num_work_days();

        let mut credit = schedule.non_trip_credit();
        let mut score = 0;
        let mut num_working_days = 0;
        for key in &retained_keys {
            let (Some(trip_credit), Some(days), Some(points)) =
                (credits.get(key), work_days.get(key), trip_scores.get(key))
            else {
                return Err(BidError::Invariant(format!(
                    "retained key {} not in schedule {}",
                    key, schedule
                )));
            };
            credit = credit + *trip_credit;
            num_working_days += days;
            score += points;
        }

        let drop_keys = schedule
            .keys()
            .filter(|k| !retained_keys.contains(*k))
            .cloned()
            .collect();
        let original_num_working_days = work_days.values().sum();

        Ok(Self {
            schedule,
            retained_keys,
            drop_keys,
            credit,
            score,
            num_working_days,
            original_num_working_days,
        })
    }

    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    pub fn retained_keys(&self) -> &BTreeSet<PairingKey> {
        &self.retained_keys
    }

    pub fn retained_trips(&self) -> impl Iterator<Item = &Trip> {
        self.retained_keys.iter().filter_map(|k| self.schedule.trip(k))
    }

    pub fn drop_keys(&self) -> &BTreeSet<PairingKey> {
        &self.drop_keys
    }

    pub fn non_trip_intervals(&self) -> &BTreeSet<Interval> {
        self.schedule.non_trip_intervals()
    }

    /// Retained trip credit plus non-trip credit.
    pub fn credit(&self) -> Period {
        self.credit
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn num_working_days(&self) -> usize {
        self.num_working_days
    }

    pub fn original_num_working_days(&self) -> usize {
        self.original_num_working_days
    }
}

impl fmt::Display for ReducedSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.retained_keys.iter().map(|k| k.name.as_str()).collect();
        write!(f, "[{}] ({} credit, {} days)", names.join(":"), self.credit, self.num_working_days)
    }
}

/// A reduced schedule plus tasks picked up from opentime.
#[derive(Debug, Clone)]
pub struct ProposedSchedule {
    reduced: Arc<ReducedSchedule>,
    tasks: Vec<TaskWrapper>,
}

impl ProposedSchedule {
    pub fn new(reduced: Arc<ReducedSchedule>, tasks: Vec<TaskWrapper>) -> Self {
        Self { reduced, tasks }
    }

    pub fn reduced(&self) -> &ReducedSchedule {
        &self.reduced
    }

    pub fn tasks(&self) -> &[TaskWrapper] {
        &self.tasks
    }

    pub fn added_keys(&self) -> BTreeSet<PairingKey> {
        self.tasks.iter().map(|t| t.key().clone()).collect()
    }

    pub fn added_trips(&self) -> Vec<Trip> {
        self.tasks.iter().map(|t| t.trip().as_ref().clone()).collect()
    }

    pub fn transition(&self) -> Transition {
        Transition::new(self.added_keys(), self.reduced.drop_keys().iter().cloned())
    }

    pub fn num_working_days(&self) -> usize {
        self.reduced.num_working_days() + self.task_working_days()
    }

    pub fn credit(&self) -> Period {
        self.reduced.credit() + self.tasks.iter().map(TaskWrapper::credit).sum()
    }

    fn task_working_days(&self) -> usize {
        self.tasks.iter().map(TaskWrapper::num_days).sum()
    }

    pub fn is_valid(&self, config: &BidConfig) -> bool {
        let credit = self.credit();
        if credit < config.minimum_credit {
            debug!(%credit, "invalid: below minimum credit");
            return false;
        }

        let all_dates: BTreeSet<NaiveDate> = self
            .tasks
            .iter()
            .flat_map(|t| t.dates().iter().copied())
            .collect();
        if all_dates.len() != self.task_working_days() {
            debug!("invalid: tasks overlap each other");
            return false;
        }

        if calendar::exceeds_consecutive(config.max_consecutive_days, &all_dates) {
            debug!("invalid: exceeds consecutive days");
            return false;
        }

        if self.num_working_days() > self.reduced.original_num_working_days() {
            debug!("invalid: works more than the original schedule");
            return false;
        }
        true
    }
}

impl PartialEq for ProposedSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.reduced.retained_keys() == other.reduced.retained_keys()
            && self.added_keys() == other.added_keys()
    }
}

impl Eq for ProposedSchedule {}

impl fmt::Display for ProposedSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let added: Vec<String> = self.tasks.iter().map(|t| t.key().to_string()).collect();
        write!(f, "{} plus [{}]", self.reduced, added.join(", "))
    }
}

/// A proposal with its total score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    proposed: ProposedSchedule,
    score: i64,
}

impl Solution {
    pub fn new(proposed: ProposedSchedule) -> Self {
        let score = proposed.reduced().score() + proposed.tasks().iter().map(TaskWrapper::score).sum::<i64>();
        Self { proposed, score }
    }

    pub fn proposed(&self) -> &ProposedSchedule {
        &self.proposed
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn transition(&self) -> Transition {
        self.proposed.transition()
    }

    pub fn num_working_days(&self) -> usize {
        self.proposed.num_working_days()
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, score: {}", self.proposed, self.score)
    }
}
