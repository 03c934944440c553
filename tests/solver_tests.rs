//! Solver scenario tests
//!
//! Tests for minimality, overlap vetoes, filter constraints, and the
//! validity properties every returned solution must hold.

mod fixtures;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;

use crew_bidder::calendar::{longest_consecutive_run, Period};
use crew_bidder::config::{BidConfig, ScoringConfig};
use crew_bidder::model::{PairingKey, Schedule};
use crew_bidder::proposal::{ReducedSchedule, Solution, TaskWrapper};
use crew_bidder::solver::{sort_solutions, SolveOptions, Solver};

use fixtures::{date, ScheduleBuilder, TripBuilder};

fn wrap(trip: &TripBuilder, total_hours: i64) -> TaskWrapper {
    TaskWrapper::new(
        trip.task(total_hours),
        Arc::new(trip.build()),
        &ScoringConfig::default(),
    )
}

fn solve(schedule: Schedule, tasks: Vec<TaskWrapper>, config: &BidConfig) -> Vec<Solution> {
    let mut solutions = Solver::new(Arc::new(schedule), tasks, config, date(1))
        .solve()
        .unwrap();
    sort_solutions(&mut solutions);
    solutions
}

fn names(keys: &[PairingKey]) -> Vec<&str> {
    keys.iter().map(|k| k.name.as_str()).collect()
}

fn adds(solution: &Solution) -> Vec<String> {
    solution
        .transition()
        .add_keys()
        .iter()
        .map(|k| k.name.clone())
        .collect()
}

/// Three trips, 88 credit hours over 11 days.
fn busy_schedule() -> Schedule {
    ScheduleBuilder::new()
        .trip(TripBuilder::new("L1", 5).days(4).credit_per_day(8))
        .trip(TripBuilder::new("L2", 12).days(3).credit_per_day(8))
        .trip(TripBuilder::new("L3", 24).days(4).credit_per_day(8))
        .build()
}

fn busy_opentime() -> Vec<TaskWrapper> {
    vec![
        wrap(&TripBuilder::new("T1", 16).days(3), 25),
        wrap(&TripBuilder::new("T2", 19).days(2), 20),
        wrap(&TripBuilder::new("T3", 28).days(3), 30),
        wrap(&TripBuilder::new("T4", 13).days(3), 28),
        wrap(&TripBuilder::new("T5", 8).days(2), 18),
    ]
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_drops_small_trip_for_big_task() {
    let schedule = ScheduleBuilder::new()
        .trip(TripBuilder::new("L100", 10).days(4).credit_per_day(5))
        .build();
    let task = wrap(&TripBuilder::new("T200", 20).days(3), 70);

    let solutions = solve(schedule, vec![task], &BidConfig::default());

    assert!(!solutions.is_empty());
    let best = solutions[0].transition();
    assert_eq!(names(best.drop_keys()), vec!["L100"]);
    assert_eq!(names(best.add_keys()), vec!["T200"]);
    assert_eq!(solutions[0].num_working_days(), 3);
}

#[test]
fn test_required_day_off_vetoes_task() {
    let schedule = ScheduleBuilder::new()
        .trip(TripBuilder::new("L100", 10).days(4).credit_per_day(5))
        .build();
    let tasks = vec![
        wrap(&TripBuilder::new("T200", 20).days(3), 70),
        wrap(&TripBuilder::new("T300", 25).days(3), 70),
    ];
    let config = BidConfig {
        required_days_off: vec![date(21)],
        ..BidConfig::default()
    };

    let solutions = solve(schedule, tasks, &config);

    assert!(solutions.iter().all(|s| !adds(s).contains(&"T200".to_string())));
    assert!(solutions.iter().any(|s| adds(s) == vec!["T300".to_string()]));
}

#[test]
fn test_no_solution_when_nothing_improves() {
    // Same days, same score, less credit.
    let schedule = ScheduleBuilder::new()
        .trip(TripBuilder::new("L100", 10).days(3).credit_per_day(25))
        .build();
    let task = wrap(&TripBuilder::new("T200", 20).days(3), 70);

    let solutions = solve(schedule, vec![task], &BidConfig::default());
    assert!(solutions.is_empty());
}

#[test]
fn test_never_adds_more_than_it_drops() {
    let schedule = ScheduleBuilder::new()
        .trip(TripBuilder::new("L100", 10).days(4).credit_per_day(20))
        .build();
    let tasks = vec![
        wrap(&TripBuilder::new("T1", 20).days(1), 70),
        wrap(&TripBuilder::new("T2", 25).days(1), 70),
    ];

    let solutions = solve(schedule, tasks, &BidConfig::default());

    assert!(!solutions.is_empty());
    for solution in &solutions {
        let transition = solution.transition();
        assert!(transition.add_keys().len() <= transition.drop_keys().len());
    }
}

#[test]
fn test_undroppable_trip_is_always_retained() {
    let schedule = ScheduleBuilder::new()
        .trip(TripBuilder::new("CB1", 10).days(2).undroppable())
        // Departs inside the swap pre-period.
        .trip(TripBuilder::new("L2", 3).days(2).credit_per_day(10))
        .trip(TripBuilder::new("L3", 20).days(4).credit_per_day(10))
        .build();
    let tasks = vec![wrap(&TripBuilder::new("T1", 25).days(2), 60)];
    let config = BidConfig {
        minimum_credit: Period::hours(40),
        ..BidConfig::default()
    };

    let solutions = solve(schedule, tasks, &config);

    assert!(!solutions.is_empty());
    for solution in &solutions {
        let dropped = names(solution.transition().drop_keys())
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        assert!(!dropped.contains(&"CB1".to_string()));
        assert!(!dropped.contains(&"L2".to_string()));
    }
}

#[test]
fn test_forced_drop_is_always_dropped() {
    let l1 = TripBuilder::new("L1", 5).days(4).credit_per_day(8);
    let config = BidConfig {
        forced_drops: vec![l1.key()],
        minimum_credit: Period::hours(40),
        ..BidConfig::default()
    };

    let solutions = solve(busy_schedule(), busy_opentime(), &config);

    assert!(!solutions.is_empty());
    assert!(solutions
        .iter()
        .all(|s| s.transition().drop_keys().contains(&l1.key())));
}

#[test]
fn test_candidate_cap_keeps_best_tasks() {
    let options = SolveOptions {
        max_candidate_tasks: 2,
        parallel: false,
    };
    let config = BidConfig {
        minimum_credit: Period::hours(20),
        ..BidConfig::default()
    };
    let solutions = Solver::new(Arc::new(busy_schedule()), busy_opentime(), &config, date(1))
        .with_options(options)
        .solve()
        .unwrap();

    // With nothing retained all five tasks qualify, and every task scores the
    // same, so the cap keeps the first two by key.
    let drop_everything: Vec<&Solution> = solutions
        .iter()
        .filter(|s| s.transition().drop_keys().len() == 3)
        .collect();
    assert!(!drop_everything.is_empty());
    for solution in drop_everything {
        for name in adds(solution) {
            assert!(name == "T1" || name == "T2", "unexpected {}", name);
        }
    }
}

#[test]
fn test_parallel_and_serial_agree() {
    let config = BidConfig {
        minimum_credit: Period::hours(60),
        ..BidConfig::default()
    };
    let run = |parallel| {
        let mut solutions = Solver::new(Arc::new(busy_schedule()), busy_opentime(), &config, date(1))
            .with_options(SolveOptions {
                parallel,
                ..SolveOptions::default()
            })
            .solve()
            .unwrap();
        sort_solutions(&mut solutions);
        solutions.iter().map(Solution::transition).collect::<Vec<_>>()
    };
    assert_eq!(run(true), run(false));
}

#[test]
fn test_sorted_by_fewest_days_then_score() {
    let config = BidConfig {
        minimum_credit: Period::hours(60),
        ..BidConfig::default()
    };
    let solutions = solve(busy_schedule(), busy_opentime(), &config);
    assert!(solutions.len() > 1);
    for pair in solutions.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.num_working_days() < b.num_working_days()
                || (a.num_working_days() == b.num_working_days() && a.score() >= b.score())
        );
    }
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_every_solution_is_valid() {
    let config = BidConfig {
        minimum_credit: Period::hours(60),
        ..BidConfig::default()
    };
    let schedule = busy_schedule();
    let all_keys: BTreeSet<PairingKey> = schedule.keys().cloned().collect();

    let solutions = solve(schedule, busy_opentime(), &config);
    assert!(!solutions.is_empty());

    for solution in &solutions {
        let proposed = solution.proposed();
        assert!(proposed.is_valid(&config));

        let tasks = proposed.tasks();
        for (i, a) in tasks.iter().enumerate() {
            for b in &tasks[i + 1..] {
                assert!(a.dates().is_disjoint(b.dates()), "{} overlaps {}", a.key(), b.key());
            }
        }
        let union: BTreeSet<NaiveDate> = tasks.iter().flat_map(|t| t.dates().iter().copied()).collect();
        assert!(longest_consecutive_run(&union) <= config.max_consecutive_days);
        assert!(proposed.num_working_days() <= proposed.reduced().original_num_working_days());

        let reduced = proposed.reduced();
        let expected: BTreeSet<PairingKey> = all_keys.difference(reduced.retained_keys()).cloned().collect();
        assert_eq!(reduced.drop_keys(), &expected);
    }
}

#[test]
fn test_drop_keys_complement_retained_keys() {
    let schedule = Arc::new(busy_schedule());
    let config = BidConfig::default();
    let scores: BTreeMap<PairingKey, i64> = schedule.keys().map(|k| (k.clone(), 0)).collect();
    let all_keys: BTreeSet<PairingKey> = schedule.keys().cloned().collect();

    let solver = Solver::new(schedule.clone(), vec![], &config, date(1));
    let sets = solver.retained_sets();
    assert_eq!(sets.len(), 8);

    for retained in sets {
        let reduced = ReducedSchedule::new(schedule.clone(), retained.clone(), &scores).unwrap();
        let expected: BTreeSet<PairingKey> = all_keys.difference(&retained).cloned().collect();
        assert_eq!(reduced.drop_keys(), &expected);
    }
}
