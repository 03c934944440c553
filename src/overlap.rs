//! Classifies how a candidate conflicts with a reduced schedule.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use crate::calendar::Interval;
use crate::config::BidConfig;
use crate::model::{PairingKey, Trip};
use crate::proposal::ReducedSchedule;

/// Two trips back to back are only acceptable up to this many days total.
const MAX_DAYS_IN_A_ROW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlap {
    /// Hits vacation or training.
    Undroppable,
    /// Hits a required day off.
    DayOff,
    /// Hits, or crowds, a trip still on the schedule.
    RetainedTrip,
    NoOverlap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapEvaluation {
    pub overlap: Overlap,
    pub overlapped_trips: BTreeSet<PairingKey>,
}

impl OverlapEvaluation {
    fn of(overlap: Overlap) -> Self {
        Self {
            overlap,
            overlapped_trips: BTreeSet::new(),
        }
    }
}

pub struct OverlapEvaluator<'a> {
    reduced: &'a ReducedSchedule,
    required_days_off: BTreeSet<NaiveDate>,
    minimum_days_between_trips: u64,
}

impl<'a> OverlapEvaluator<'a> {
    pub fn new(reduced: &'a ReducedSchedule, config: &BidConfig) -> Self {
        Self {
            reduced,
            required_days_off: config.required_days_off.iter().copied().collect(),
            minimum_days_between_trips: config.minimum_days_between_trips,
        }
    }

    /// Evaluates the dates of a task we're looking at adding.
    pub fn evaluate_dates(&self, dates: &BTreeSet<NaiveDate>) -> OverlapEvaluation {
        let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
            return OverlapEvaluation::of(Overlap::NoOverlap);
        };
        self.evaluate(Interval::from_dates(*first, *last), dates)
    }

    pub fn evaluate_trip(&self, trip: &Trip) -> OverlapEvaluation {
        self.evaluate(trip.interval(), &trip.departure_dates)
    }

    fn evaluate(&self, interval: Interval, dates: &BTreeSet<NaiveDate>) -> OverlapEvaluation {
        if self
            .reduced
            .non_trip_intervals()
            .iter()
            .any(|existing| existing.overlaps(&interval))
        {
            return OverlapEvaluation::of(Overlap::Undroppable);
        }

        if !self.required_days_off.is_disjoint(dates) {
            return OverlapEvaluation::of(Overlap::DayOff);
        }

        let overlapped_trips: BTreeSet<PairingKey> = self
            .reduced
            .retained_trips()
            .filter(|trip| self.conflicts_with(trip, dates))
            .map(|trip| trip.key.clone())
            .collect();
        if !overlapped_trips.is_empty() {
            return OverlapEvaluation {
                overlap: Overlap::RetainedTrip,
                overlapped_trips,
            };
        }

        OverlapEvaluation::of(Overlap::NoOverlap)
    }

    fn conflicts_with(&self, retained: &Trip, dates: &BTreeSet<NaiveDate>) -> bool {
        let scheduled = &retained.departure_dates;
        let (Some(first), Some(last)) = (scheduled.first().copied(), scheduled.last().copied())
        else {
            return false;
        };
        if !scheduled.is_disjoint(dates) {
            return true;
        }

        if self.minimum_days_between_trips > 0 {
            let rest = Days::new(self.minimum_days_between_trips);
            let widened_start = first - rest;
            let widened_end = last + rest;
            if dates.iter().any(|d| *d >= widened_start && *d <= widened_end) {
                return true;
            }
        }

        let prior = first - Days::new(1);
        let next = last + Days::new(1);
        if dates.contains(&prior) || dates.contains(&next) {
            scheduled.len() + dates.len() > MAX_DAYS_IN_A_ROW
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Period, YearMonth};
    use crate::model::{BlockKind, Schedule, ScheduleBlock, Section};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 10, day).unwrap()
    }

    fn trip(name: &str, first: u32, days: u32) -> Trip {
        let sections = (first..first + days)
            .map(|d| Section {
                date: date(d),
                legs: vec![],
                layover_airport: None,
                layover_duration: Period::ZERO,
                block: Period::ZERO,
                credit: Period::hours(5),
                duty: Period::hours(8),
                duty_start: date(d).and_hms_opt(10, 0, 0).unwrap(),
                duty_end: date(d).and_hms_opt(17, 0, 0).unwrap(),
            })
            .collect();
        Trip::new(PairingKey::new(date(first), name), sections, vec![])
    }

    fn reduced_with(trips: Vec<Trip>, blocks: Vec<ScheduleBlock>) -> ReducedSchedule {
        let ym: YearMonth = "2019-10".parse().unwrap();
        let schedule = Arc::new(Schedule::new(ym, trips, blocks));
        let keys: BTreeSet<PairingKey> = schedule.keys().cloned().collect();
        let scores: BTreeMap<PairingKey, i64> = keys.iter().map(|k| (k.clone(), 0)).collect();
        ReducedSchedule::new(schedule, keys, &scores).unwrap()
    }

    fn days(first: u32, n: u32) -> BTreeSet<NaiveDate> {
        crate::calendar::date_run(date(first), n)
    }

    #[test]
    fn test_vacation_is_undroppable() {
        let vacation = ScheduleBlock {
            kind: BlockKind::Vacation,
            interval: Interval::from_dates(date(10), date(16)),
            credit: Period::hours(20),
        };
        let reduced = reduced_with(vec![], vec![vacation]);
        let evaluator = OverlapEvaluator::new(&reduced, &BidConfig::default());
        assert_eq!(evaluator.evaluate_dates(&days(15, 3)).overlap, Overlap::Undroppable);
        assert_eq!(evaluator.evaluate_dates(&days(17, 3)).overlap, Overlap::NoOverlap);
    }

    #[test]
    fn test_required_day_off() {
        let reduced = reduced_with(vec![], vec![]);
        let config = BidConfig {
            required_days_off: vec![date(21)],
            ..BidConfig::default()
        };
        let evaluator = OverlapEvaluator::new(&reduced, &config);
        assert_eq!(evaluator.evaluate_dates(&days(20, 2)).overlap, Overlap::DayOff);
        assert_eq!(evaluator.evaluate_trip(&trip("L9", 20, 3)).overlap, Overlap::DayOff);
    }

    #[test]
    fn test_retained_trip_overlap_names_the_trip() {
        let held = trip("L1", 10, 3);
        let reduced = reduced_with(vec![held.clone()], vec![]);
        let evaluator = OverlapEvaluator::new(&reduced, &BidConfig::default());
        let evaluation = evaluator.evaluate_dates(&days(12, 2));
        assert_eq!(evaluation.overlap, Overlap::RetainedTrip);
        assert!(evaluation.overlapped_trips.contains(&held.key));
    }

    #[test]
    fn test_short_candidates_may_abut() {
        let reduced = reduced_with(vec![trip("L1", 10, 3)], vec![]);
        let evaluator = OverlapEvaluator::new(&reduced, &BidConfig::default());
        // 3 + 2 days in a row is fine, 3 + 3 is not.
        assert_eq!(evaluator.evaluate_dates(&days(13, 2)).overlap, Overlap::NoOverlap);
        assert_eq!(evaluator.evaluate_dates(&days(7, 3)).overlap, Overlap::RetainedTrip);
    }

    #[test]
    fn test_minimum_days_between_trips() {
        let reduced = reduced_with(vec![trip("L1", 10, 3)], vec![]);
        let config = BidConfig {
            minimum_days_between_trips: 2,
            ..BidConfig::default()
        };
        let evaluator = OverlapEvaluator::new(&reduced, &config);
        assert_eq!(evaluator.evaluate_dates(&days(14, 1)).overlap, Overlap::RetainedTrip);
        assert_eq!(evaluator.evaluate_dates(&days(15, 1)).overlap, Overlap::NoOverlap);
    }
}
