//! The orchestration loop.
//!
//! Waits for a fresh snapshot, solves, and submits the best few swaps that
//! haven't been proposed before.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::calendar::YearMonth;
use crate::clock::Clock;
use crate::collector::{Collector, Snapshot};
use crate::config::{BidConfig, BidRound};
use crate::error::BidError;
use crate::model::SwapStatus;
use crate::proposal::{Solution, TaskWrapper};
use crate::solver::{sort_solutions, SolveOptions, Solver};
use crate::stats::RuntimeStats;
use crate::traits::FlicaService;
use crate::transition::Transition;
use crate::tree::{ScheduleWrapper, ScheduleWrapperTree};
use crate::trip_database::TripDatabase;

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Every offered pairing had already been considered since the last reroot.
    pub nothing_new: bool,
    pub solutions: usize,
    pub submitted: Vec<Transition>,
    pub duplicates: Vec<Transition>,
    pub skipped: Vec<Transition>,
    pub failed: Vec<Transition>,
}

impl CycleReport {
    fn attempts(&self) -> usize {
        self.submitted.len() + self.duplicates.len() + self.failed.len()
    }
}

pub struct Worker {
    service: Arc<dyn FlicaService>,
    collector: Arc<Collector>,
    tree: Arc<ScheduleWrapperTree>,
    trip_database: Arc<TripDatabase>,
    stats: Arc<RuntimeStats>,
    clock: Arc<dyn Clock>,
    config: BidConfig,
    year_month: YearMonth,
    round: BidRound,
    options: SolveOptions,
    /// Everything this process has ever submitted.
    submitted: HashSet<Transition>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: Arc<dyn FlicaService>,
        collector: Arc<Collector>,
        tree: Arc<ScheduleWrapperTree>,
        trip_database: Arc<TripDatabase>,
        stats: Arc<RuntimeStats>,
        clock: Arc<dyn Clock>,
        config: BidConfig,
        year_month: YearMonth,
        round: BidRound,
    ) -> Self {
        Self {
            service,
            collector,
            tree,
            trip_database,
            stats,
            clock,
            config,
            year_month,
            round,
            options: SolveOptions::default(),
            submitted: HashSet::new(),
        }
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Blocks on the collector, then runs one cycle.
    pub fn run_once(&mut self) -> Result<CycleReport, BidError> {
        let snapshot = self.collector.begin_work();
        self.process(snapshot)
    }

    pub fn run(mut self) {
        loop {
            if let Err(err) = self.run_once() {
                error!(error = %err, "worker cycle failed");
            }
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>, BidError> {
        let handle = thread::Builder::new()
            .name("worker".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    pub fn process(&mut self, snapshot: Snapshot) -> Result<CycleReport, BidError> {
        let mut report = CycleReport::default();
        let root = ScheduleWrapper::new(snapshot.schedule.clone());
        self.tree.set_root(root.clone());

        let fresh = snapshot
            .tasks
            .iter()
            .filter(|task| self.tree.should_process(&task.pairing_key()))
            .count();
        if fresh == 0 {
            info!(tasks = snapshot.tasks.len(), "no new opentime since last reroot");
            self.stats.record_skipped_cycle();
            report.nothing_new = true;
            return Ok(report);
        }
        let mut wrappers = Vec::with_capacity(snapshot.tasks.len());
        let mut resolved = Vec::with_capacity(snapshot.tasks.len());
        for task in snapshot.tasks {
            let key = task.pairing_key();
            match self.trip_database.get_trip(&key) {
                Ok(trip) => {
                    wrappers.push(TaskWrapper::new(task, trip, &self.config.scoring));
                    resolved.push(key);
                }
                Err(err) => warn!(%key, error = %err, "unable to resolve opentime trip, will retry"),
            }
        }
        info!(tasks = wrappers.len(), fresh, "considering opentime");

        let today = self.clock.today();
        let mut solutions = Solver::new(snapshot.schedule, wrappers, &self.config, today)
            .with_options(self.options.clone())
            .solve()?;
        // Unresolved keys stay fresh so the next offer reconsiders them.
        for key in resolved {
            self.tree.mark_processed(key);
        }
        sort_solutions(&mut solutions);
        report.solutions = solutions.len();
        self.stats.record_cycle(solutions.len());
        info!(solutions = solutions.len(), "solver cycle complete");

        for solution in &solutions {
            if report.attempts() >= self.config.max_swaps_per_cycle {
                info!(cap = self.config.max_swaps_per_cycle, "swap cap reached");
                break;
            }
            self.submit(&root, solution, today, &mut report);
        }
        Ok(report)
    }

    fn submit(
        &mut self,
        root: &ScheduleWrapper,
        solution: &Solution,
        today: chrono::NaiveDate,
        report: &mut CycleReport,
    ) {
        let transition = solution.transition();
        if self.tree.contains_transition(&transition) || self.submitted.contains(&transition) {
            info!(%transition, "skipping known transition");
            self.stats.record_skipped_transition();
            report.skipped.push(transition);
            return;
        }
        self.submitted.insert(transition.clone());

        info!(%transition, score = solution.score(), days = solution.num_working_days(), "submitting swap");
        let response = self.service.submit_swap(
            self.round,
            self.year_month,
            today,
            transition.add_keys(),
            transition.drop_keys(),
        );
        let status = match response {
            Ok(raw) => SwapStatus::parse(&raw),
            Err(err) => {
                error!(%transition, error = %err, "swap submission failed");
                self.stats.record_failure();
                report.failed.push(transition);
                return;
            }
        };
        self.stats.record_submission(&transition, status);
        match status {
            SwapStatus::Success => info!(%transition, "swap submitted"),
            SwapStatus::Duplicate => info!(%transition, "duplicate swap request, already submitted"),
        }

        match root.mutate(&solution.proposed().added_trips(), transition.drop_keys()) {
            Ok(child) => {
                if let Err(err) = self.tree.add_transition(root, transition.clone(), child) {
                    warn!(%transition, error = %err, "unable to record speculative schedule");
                }
            }
            Err(err) => warn!(%transition, error = %err, "unable to build speculative schedule"),
        }

        match status {
            SwapStatus::Success => report.submitted.push(transition),
            SwapStatus::Duplicate => report.duplicates.push(transition),
        }
    }
}
