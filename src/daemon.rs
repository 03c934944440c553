//! Run-forever pollers.
//!
//! Each poller owns one thread. It sleeps an initial delay, does its initial
//! work once, then loops doing periodic work. Failed cycles are retried after
//! a short failure interval, up to a budget, after which the poller falls
//! back to its normal interval.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{BidderConfig, PollerConfig};
use crate::error::BidError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Complete,
    /// Retry after the failure interval.
    Incomplete,
    /// Stop the poller for good.
    Halt,
}

pub trait PeriodicWork: Send + 'static {
    fn name(&self) -> &str;

    fn do_initial_work(&mut self) {}

    fn do_periodic_work(&mut self) -> WorkResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonSchedule {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub failure_interval: Duration,
    pub max_failures_before_sleeping: u32,
}

impl DaemonSchedule {
    pub fn for_poller(config: &BidderConfig, poller: &PollerConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            interval: poller.interval(),
            failure_interval: config.failure_interval(),
            max_failures_before_sleeping: poller.max_failures_before_sleeping,
        }
    }
}

/// What to do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    FailureInterval,
    Interval,
    Stop,
}

/// Consecutive-failure counter behind the retry-then-resume policy.
///
/// The failure that spends the budget is followed by the normal interval.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_failures: u32,
    failures: u32,
}

impl RetryPolicy {
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures: max_failures.max(1),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record(&mut self, result: WorkResult) -> Pause {
        match result {
            WorkResult::Halt => Pause::Stop,
            WorkResult::Complete => {
                self.failures = 0;
                Pause::Interval
            }
            WorkResult::Incomplete => {
                self.failures += 1;
                if self.failures < self.max_failures {
                    Pause::FailureInterval
                } else {
                    self.failures = 0;
                    Pause::Interval
                }
            }
        }
    }
}

/// Opens once, the first time a poller finishes a cycle.
#[derive(Debug, Default)]
pub struct InitialRunLatch {
    done: Mutex<bool>,
    opened: Condvar,
}

impl InitialRunLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let mut done = match self.done.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !*done {
            *done = true;
            self.opened.notify_all();
        }
    }

    pub fn is_open(&self) -> bool {
        match self.done.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn wait(&self) {
        let done = match self.done.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _done = match self.opened.wait_while(done, |done| !*done) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
    }

    /// Returns whether the latch opened within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = match self.done.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (done, _) = match self.opened.wait_timeout_while(done, timeout, |done| !*done) {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        *done
    }
}

pub struct DaemonHandle {
    name: String,
    latch: Arc<InitialRunLatch>,
    thread: JoinHandle<()>,
}

impl DaemonHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latch(&self) -> Arc<InitialRunLatch> {
        self.latch.clone()
    }

    pub fn wait_for_initial_run(&self) {
        self.latch.wait()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

pub struct PeriodicDaemon;

impl PeriodicDaemon {
    pub fn spawn<W: PeriodicWork>(work: W, schedule: DaemonSchedule) -> Result<DaemonHandle, BidError> {
        let name = work.name().to_string();
        let latch = Arc::new(InitialRunLatch::new());
        let thread_latch = latch.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(work, schedule, &thread_latch))?;
        Ok(DaemonHandle { name, latch, thread })
    }
}

/// The poller loop. Returns only when the work halts.
pub fn run<W: PeriodicWork>(mut work: W, schedule: DaemonSchedule, latch: &InitialRunLatch) {
    if !schedule.initial_delay.is_zero() {
        info!(poller = work.name(), delay = ?schedule.initial_delay, "waiting initially");
        thread::sleep(schedule.initial_delay);
    }
    work.do_initial_work();

    let mut policy = RetryPolicy::new(schedule.max_failures_before_sleeping);
    loop {
        let result = work.do_periodic_work();
        match policy.record(result) {
            Pause::FailureInterval => {
                debug!(poller = work.name(), failures = policy.failures(), "cycle incomplete, retrying");
                sleep(schedule.failure_interval);
            }
            Pause::Interval => {
                latch.open();
                sleep(schedule.interval);
            }
            Pause::Stop => {
                warn!(poller = work.name(), "halting");
                latch.open();
                return;
            }
        }
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_policy_falls_back_to_interval() {
        let mut policy = RetryPolicy::new(3);
        assert_eq!(policy.record(WorkResult::Incomplete), Pause::FailureInterval);
        assert_eq!(policy.record(WorkResult::Incomplete), Pause::FailureInterval);
        assert_eq!(policy.record(WorkResult::Incomplete), Pause::Interval);
        assert_eq!(policy.failures(), 0);
        assert_eq!(policy.record(WorkResult::Incomplete), Pause::FailureInterval);
        assert_eq!(policy.record(WorkResult::Complete), Pause::Interval);
        assert_eq!(policy.failures(), 0);
        assert_eq!(policy.record(WorkResult::Halt), Pause::Stop);
    }

    #[test]
    fn test_zero_budget_behaves_like_one() {
        let mut policy = RetryPolicy::new(0);
        assert_eq!(policy.record(WorkResult::Incomplete), Pause::Interval);
    }

    struct Countdown {
        calls: Arc<AtomicUsize>,
        initial: Arc<AtomicUsize>,
        results: Vec<WorkResult>,
    }

    impl PeriodicWork for Countdown {
        fn name(&self) -> &str {
            "countdown"
        }

        fn do_initial_work(&mut self) {
            self.initial.fetch_add(1, Ordering::SeqCst);
        }

        fn do_periodic_work(&mut self) -> WorkResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.pop().unwrap_or(WorkResult::Halt)
        }
    }

    #[test]
    fn test_daemon_runs_until_halt_and_opens_latch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let initial = Arc::new(AtomicUsize::new(0));
        let work = Countdown {
            calls: calls.clone(),
            initial: initial.clone(),
            // Popped from the back.
            results: vec![WorkResult::Complete, WorkResult::Incomplete, WorkResult::Incomplete],
        };
        let schedule = DaemonSchedule {
            initial_delay: Duration::ZERO,
            interval: Duration::ZERO,
            failure_interval: Duration::ZERO,
            max_failures_before_sleeping: 5,
        };
        let handle = PeriodicDaemon::spawn(work, schedule).unwrap();
        assert!(handle.latch().wait_timeout(Duration::from_secs(5)));
        assert_eq!(handle.name(), "countdown");
        handle.join().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(initial.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_latch_times_out_when_never_opened() {
        let latch = InitialRunLatch::new();
        assert!(!latch.wait_timeout(Duration::from_millis(10)));
        latch.open();
        latch.wait();
        assert!(latch.is_open());
    }
}
