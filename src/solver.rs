//! Swap solver.
//!
//! Enumerates every allowed subset of held trips to keep, and for each one
//! every allowed combination of opentime tasks to pick up, keeping the
//! combinations that work fewer days, or the same days with a better score.
//! Both enumerations are exponential, so the filters run before each level
//! of enumeration rather than after.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::calendar::Calendar;
use crate::config::BidConfig;
use crate::error::BidError;
use crate::filter::{ScheduleFilter, TaskFilter};
use crate::model::{PairingKey, Schedule};
use crate::overlap::{Overlap, OverlapEvaluator};
use crate::proposal::{ProposedSchedule, ReducedSchedule, Solution, TaskWrapper};
use crate::score::TripScore;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Candidate tasks considered per retained set; the best scoring are kept.
    pub max_candidate_tasks: usize,
    /// Fan retained sets out over the rayon pool.
    pub parallel: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_candidate_tasks: 30,
            parallel: true,
        }
    }
}

pub struct Solver<'a> {
    schedule: Arc<Schedule>,
    tasks: Vec<TaskWrapper>,
    config: &'a BidConfig,
    calendar: Calendar,
    filter: ScheduleFilter,
    trip_scores: BTreeMap<PairingKey, i64>,
    original_score: i64,
    options: SolveOptions,
}

impl<'a> Solver<'a> {
    pub fn new(
        schedule: Arc<Schedule>,
        tasks: Vec<TaskWrapper>,
        config: &'a BidConfig,
        today: NaiveDate,
    ) -> Self {
        let trip_scores: BTreeMap<PairingKey, i64> = schedule
            .trips()
            .iter()
            .map(|(k, t)| (k.clone(), TripScore::new(t, &config.scoring).points()))
            .collect();
        let original_score = trip_scores.values().sum();
        Self {
            calendar: Calendar::new(schedule.year_month()),
            filter: ScheduleFilter::new(&schedule, config, today),
            schedule,
            tasks,
            config,
            trip_scores,
            original_score,
            options: SolveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn original_score(&self) -> i64 {
        self.original_score
    }

    pub fn solve(&self) -> Result<Vec<Solution>, BidError> {
        let retained_sets = self.retained_sets();
        let per_set: Vec<Vec<Solution>> = if self.options.parallel {
            retained_sets
                .into_par_iter()
                .map(|retained| self.solutions_for(retained))
                .collect::<Result<_, _>>()?
        } else {
            retained_sets
                .into_iter()
                .map(|retained| self.solutions_for(retained))
                .collect::<Result<_, _>>()?
        };
        let num_sets = per_set.len();
        let solutions: Vec<Solution> = per_set.into_iter().flatten().collect();
        info!(
            schedule_combinations = num_sets,
            tasks = self.tasks.len(),
            solutions = solutions.len(),
            "solver finished"
        );
        Ok(solutions)
    }

    /// Every subset of held keys the filter allows, built without
    /// materializing the rest of the power set.
    pub fn retained_sets(&self) -> Vec<BTreeSet<PairingKey>> {
        let keys: Vec<&PairingKey> = self.schedule.keys().collect();
        let mut sets = Vec::new();
        let mut current = BTreeSet::new();
        self.collect_retained(&keys, &mut current, &mut sets);
        sets
    }

    fn collect_retained(
        &self,
        keys: &[&PairingKey],
        current: &mut BTreeSet<PairingKey>,
        out: &mut Vec<BTreeSet<PairingKey>>,
    ) {
        let Some((key, rest)) = keys.split_first() else {
            if self.filter.test(current) {
                out.push(current.clone());
            }
            return;
        };
        if current.len() + 1 + rest.len() < self.config.minimum_retained_trips {
            return;
        }
        if !self.filter.must_drop(key) {
            current.insert((*key).clone());
            self.collect_retained(rest, current, out);
            current.remove(*key);
        }
        if !self.filter.must_retain(key) {
            self.collect_retained(rest, current, out);
        }
    }

    fn solutions_for(&self, retained: BTreeSet<PairingKey>) -> Result<Vec<Solution>, BidError> {
        let reduced = Arc::new(ReducedSchedule::new(
            self.schedule.clone(),
            retained,
            &self.trip_scores,
        )?);
        debug!(%reduced, "considering schedule combination");

        let task_filter = TaskFilter::new(self.config, reduced.drop_keys().len());
        if task_filter.max_adds() == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.candidate_tasks(&reduced);
        let mut solutions = Vec::new();
        let mut chosen: Vec<&TaskWrapper> = Vec::new();
        self.enumerate_tasks(&reduced, &task_filter, &candidates, &mut chosen, &mut solutions);
        Ok(solutions)
    }

    fn candidate_tasks(&self, reduced: &ReducedSchedule) -> Vec<&TaskWrapper> {
        let evaluator = OverlapEvaluator::new(reduced, self.config);
        let mut candidates: Vec<&TaskWrapper> = self
            .tasks
            .iter()
            .filter(|task| {
                if !task.dates().iter().all(|d| self.calendar.is_within_period(*d)) {
                    debug!(task = %task.key(), "ignoring task outside blend period");
                    return false;
                }
                let evaluation = evaluator.evaluate_dates(task.dates());
                if evaluation.overlap != Overlap::NoOverlap {
                    debug!(task = %task.key(), overlap = ?evaluation.overlap, "ignoring task due to overlap");
                    return false;
                }
                true
            })
            .collect();

        if candidates.len() > self.options.max_candidate_tasks {
            info!(
                candidates = candidates.len(),
                keep = self.options.max_candidate_tasks,
                "paring down candidate tasks by score"
            );
            candidates.sort_by(|a, b| b.score().cmp(&a.score()).then_with(|| a.key().cmp(b.key())));
            candidates.truncate(self.options.max_candidate_tasks);
        }
        candidates
    }

    fn enumerate_tasks<'t>(
        &self,
        reduced: &Arc<ReducedSchedule>,
        filter: &TaskFilter,
        remaining: &[&'t TaskWrapper],
        chosen: &mut Vec<&'t TaskWrapper>,
        out: &mut Vec<Solution>,
    ) {
        let Some((task, rest)) = remaining.split_first() else {
            if !chosen.is_empty() {
                self.evaluate(reduced, filter, chosen, out);
            }
            return;
        };
        if filter.admits(chosen, task) {
            chosen.push(*task);
            self.enumerate_tasks(reduced, filter, rest, chosen, out);
            chosen.pop();
        }
        self.enumerate_tasks(reduced, filter, rest, chosen, out);
    }

    fn evaluate(
        &self,
        reduced: &Arc<ReducedSchedule>,
        filter: &TaskFilter,
        chosen: &[&TaskWrapper],
        out: &mut Vec<Solution>,
    ) {
        if !filter.test(chosen) {
            return;
        }
        let proposed = ProposedSchedule::new(
            reduced.clone(),
            chosen.iter().map(|t| (*t).clone()).collect(),
        );
        if !proposed.is_valid(self.config) {
            return;
        }

        let solution = Solution::new(proposed);
        let days = solution.num_working_days();
        let original_days = reduced.original_num_working_days();
        let work_less = days < original_days;
        let work_same = days == original_days;
        let better = solution.score() > self.original_score;
        debug!(
            transition = %solution.transition(),
            work_less,
            work_same,
            better,
            score = solution.score(),
            original_score = self.original_score,
            "evaluated proposal"
        );
        if work_less || (work_same && better) {
            out.push(solution);
        }
    }
}

/// Fewer working days first, then higher score.
///
/// Ties fall back to the transition so the order is deterministic.
pub fn compare_solutions(a: &Solution, b: &Solution) -> Ordering {
    a.num_working_days()
        .cmp(&b.num_working_days())
        .then_with(|| b.score().cmp(&a.score()))
        .then_with(|| a.transition().cmp(&b.transition()))
}

pub fn sort_solutions(solutions: &mut [Solution]) {
    solutions.sort_by(compare_solutions);
}
