//! Immutable value types produced by the portal adapters.
//!
//! Schedules, trips and opentime tasks are snapshots: they are replaced
//! wholesale on every refresh and never edited in place.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::calendar::{self, Calendar, Interval, Period, YearMonth};
use crate::error::BidError;
use crate::transition::Transition;

/// Pairing names repeat from month to month and mean different trips, so
/// the date is part of a trip's identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairingKey {
    pub date: NaiveDate,
    pub name: String,
}

impl PairingKey {
    pub fn new(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
        }
    }
}

impl fmt::Display for PairingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.date, self.name)
    }
}

impl FromStr for PairingKey {
    type Err = BidError;

    /// Parses `2019-10-05:L1234`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, name) = s
            .split_once(':')
            .ok_or_else(|| BidError::Config(format!("expected DATE:NAME, got {:?}", s)))?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| BidError::Config(format!("bad pairing date in {:?}: {}", s, e)))?;
        if name.is_empty() {
            return Err(BidError::Config(format!("empty pairing name in {:?}", s)));
        }
        Ok(PairingKey::new(date, name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Equipment {
    Rj2,
    Rj7,
    Rj9,
}

/// What a leg is used for. Only some activities can be traded away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegActivity {
    #[default]
    Flying,
    Deadhead,
    CompanyBusiness,
    GroundSchool,
    Pcr,
}

impl LegActivity {
    pub fn is_droppable(&self) -> bool {
        matches!(self, LegActivity::Flying | LegActivity::Deadhead)
    }

    fn is_flight(&self) -> bool {
        matches!(self, LegActivity::Flying | LegActivity::Deadhead)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Leg {
    pub departure_airport: String,
    pub arrival_airport: String,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub block: Period,
    pub equipment: Option<Equipment>,
    #[serde(default)]
    pub activity: LegActivity,
}

/// One duty day of a trip. It starts on `date` but may finish the next day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Section {
    pub date: NaiveDate,
    pub legs: Vec<Leg>,
    pub layover_airport: Option<String>,
    pub layover_duration: Period,
    pub block: Period,
    pub credit: Period,
    pub duty: Period,
    pub duty_start: NaiveDateTime,
    pub duty_end: NaiveDateTime,
}

impl Section {
    /// Number of actual flying legs, deadheads included.
    pub fn num_legs(&self) -> usize {
        self.flights().count()
    }

    pub fn is_droppable(&self) -> bool {
        self.legs.iter().all(|leg| leg.activity.is_droppable())
    }

    /// Airports visited during the day without an overnight.
    pub fn turn_airports(&self) -> BTreeSet<&str> {
        let flights: Vec<&Leg> = self.flights().collect();
        match flights.split_last() {
            Some((_, earlier)) => earlier.iter().map(|leg| leg.arrival_airport.as_str()).collect(),
            None => BTreeSet::new(),
        }
    }

    /// Equipment of the first operated (non-deadhead) leg is RJ2.
    pub fn is_equipment_two_hundred(&self) -> bool {
        self.flights()
            .find(|leg| leg.activity == LegActivity::Flying)
            .and_then(|leg| leg.equipment)
            .is_some_and(|equipment| equipment == Equipment::Rj2)
    }

    fn flights(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter().filter(|leg| leg.activity.is_flight())
    }
}

/// A pairing flown on a specific date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trip {
    pub key: PairingKey,
    pub sections: Vec<Section>,
    pub block: Period,
    pub credit: Period,
    pub duty: Period,
    pub departure_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub crew: Vec<String>,
}

impl Trip {
    /// Builds a trip, deriving totals and departure dates from its sections.
    pub fn new(key: PairingKey, sections: Vec<Section>, crew: Vec<String>) -> Self {
        let block = sections.iter().map(|s| s.block).sum();
        let credit = sections.iter().map(|s| s.credit).sum();
        let duty = sections.iter().map(|s| s.duty).sum();
        let departure_dates = sections.iter().map(|s| s.date).collect();
        Self {
            key,
            sections,
            block,
            credit,
            duty,
            departure_dates,
            crew,
        }
    }

    pub fn is_droppable(&self) -> bool {
        self.sections.iter().all(Section::is_droppable)
    }

    pub fn first_section(&self) -> Option<&Section> {
        self.sections.first()
    }

    pub fn last_section(&self) -> Option<&Section> {
        self.sections.last()
    }

    pub fn first_departure_date(&self) -> NaiveDate {
        self.departure_dates
            .first()
            .copied()
            .unwrap_or(self.key.date)
    }

    /// From the first duty start to the last duty end.
    pub fn interval(&self) -> Interval {
        match (self.first_section(), self.last_section()) {
            (Some(first), Some(last)) => Interval::new(first.duty_start, last.duty_end),
            _ => Interval::from_dates(self.key.date, self.key.date),
        }
    }

    /// Credit excluding sections that depart outside `year_month`.
    pub fn credit_in_month(&self, year_month: YearMonth) -> Period {
        let outside: Period = self
            .sections
            .iter()
            .filter(|s| !year_month.contains(s.date))
            .map(|s| s.credit)
            .sum();
        self.credit - outside
    }

    pub fn spans_days_of_month(&self, days: &[u32]) -> bool {
        self.departure_dates.iter().any(|d| days.contains(&d.day()))
    }

    pub fn contains_crewmember(&self, employee_ids: &[String]) -> bool {
        self.crew.iter().any(|id| employee_ids.contains(id))
    }

    pub fn num_legs(&self) -> usize {
        self.sections.iter().map(Section::num_legs).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Vacation,
    Training,
    Other,
}

/// A fixed calendar block that is never negotiable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub kind: BlockKind,
    pub interval: Interval,
    pub credit: Period,
}

/// A month of held trips plus fixed non-trip blocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ScheduleRecord", into = "ScheduleRecord")]
pub struct Schedule {
    year_month: YearMonth,
    trips: BTreeMap<PairingKey, Trip>,
    blocks: Vec<ScheduleBlock>,
    non_trip_intervals: BTreeSet<Interval>,
}

#[derive(Serialize, Deserialize)]
struct ScheduleRecord {
    year_month: YearMonth,
    trips: Vec<Trip>,
    blocks: Vec<ScheduleBlock>,
}

impl From<ScheduleRecord> for Schedule {
    fn from(record: ScheduleRecord) -> Self {
        Schedule::new(record.year_month, record.trips, record.blocks)
    }
}

impl From<Schedule> for ScheduleRecord {
    fn from(schedule: Schedule) -> Self {
        ScheduleRecord {
            year_month: schedule.year_month,
            trips: schedule.trips.into_values().collect(),
            blocks: schedule.blocks,
        }
    }
}

/// Trips cannot be swapped within this many days of departure.
const SWAP_PRE_PERIOD_DAYS: u64 = 2;

impl Schedule {
    pub fn new(year_month: YearMonth, trips: Vec<Trip>, blocks: Vec<ScheduleBlock>) -> Self {
        let trips = trips.into_iter().map(|t| (t.key.clone(), t)).collect();
        let non_trip_intervals = merge_intervals(blocks.iter().map(|b| b.interval));
        Self {
            year_month,
            trips,
            blocks,
            non_trip_intervals,
        }
    }

    pub fn year_month(&self) -> YearMonth {
        self.year_month
    }

    pub fn trips(&self) -> &BTreeMap<PairingKey, Trip> {
        &self.trips
    }

    pub fn trip(&self, key: &PairingKey) -> Option<&Trip> {
        self.trips.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PairingKey> {
        self.trips.keys()
    }

    pub fn blocks(&self) -> &[ScheduleBlock] {
        &self.blocks
    }

    /// Vacation and training, with abutting blocks merged.
    pub fn non_trip_intervals(&self) -> &BTreeSet<Interval> {
        &self.non_trip_intervals
    }

    pub fn non_trip_credit(&self) -> Period {
        self.blocks.iter().map(|b| b.credit).sum()
    }

    pub fn trip_credit_in_month(&self) -> BTreeMap<PairingKey, Period> {
        self.trips
            .iter()
            .map(|(k, t)| (k.clone(), t.credit_in_month(self.year_month)))
            .collect()
    }

    pub fn credit_in_month(&self) -> Period {
        self.non_trip_credit() + self.trip_credit_in_month().into_values().sum()
    }

    /// Working days per trip, counting only days inside the blend period.
    pub fn num_work_days(&self) -> BTreeMap<PairingKey, usize> {
        let calendar = Calendar::new(self.year_month);
        self.trips
            .iter()
            .map(|(k, t)| {
                let days = t
                    .departure_dates
                    .iter()
                    .filter(|d| calendar.is_within_period(**d))
                    .count();
                (k.clone(), days)
            })
            .collect()
    }

    /// Keys that must stay on any reduced schedule as of `today`.
    pub fn undroppable_keys(&self, today: NaiveDate) -> BTreeSet<PairingKey> {
        let cutoff = today + Days::new(SWAP_PRE_PERIOD_DAYS);
        self.trips
            .values()
            .filter(|t| !t.is_droppable() || t.first_departure_date() <= cutoff)
            .map(|t| t.key.clone())
            .collect()
    }

    /// Returns a new schedule with `drops` removed and `adds` added.
    pub fn copy_and_modify(&self, adds: &[Trip], drops: &[PairingKey]) -> Result<Schedule, BidError> {
        let mut trips = self.trips.clone();
        for key in drops {
            if trips.remove(key).is_none() {
                return Err(BidError::Invariant(format!(
                    "drop key {} not found in schedule {}",
                    key, self
                )));
            }
        }
        for trip in adds {
            trips.insert(trip.key.clone(), trip.clone());
        }
        Ok(Schedule {
            year_month: self.year_month,
            trips,
            blocks: self.blocks.clone(),
            non_trip_intervals: self.non_trip_intervals.clone(),
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.trips.keys().map(|k| k.name.as_str()).collect();
        write!(f, "{}[{}]", self.year_month, names.join(":"))
    }
}

/// Vacation shows up as a run of abutting blocks; collapse them.
fn merge_intervals(intervals: impl Iterator<Item = Interval>) -> BTreeSet<Interval> {
    let mut merged: Vec<Interval> = Vec::new();
    for mut interval in intervals {
        while let Some(pos) = merged.iter().position(|m| m.abuts(&interval)) {
            interval = interval.span(&merged.swap_remove(pos));
        }
        merged.push(interval);
    }
    merged.into_iter().collect()
}

/// An offer in the opentime pool.
///
/// Equality and hashing use the pairing name only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlicaTask {
    pub pairing_name: String,
    pub pairing_date: NaiveDate,
    pub num_days: u32,
    pub credit: Period,
    #[serde(default)]
    pub block: Period,
    #[serde(default)]
    pub layover_airports: Vec<String>,
    #[serde(default)]
    pub tradeboard_request_id: Option<u32>,
}

impl FlicaTask {
    pub fn new(key: PairingKey, credit: Period, num_days: u32) -> Self {
        Self {
            pairing_name: key.name,
            pairing_date: key.date,
            num_days,
            credit,
            block: Period::ZERO,
            layover_airports: Vec::new(),
            tradeboard_request_id: None,
        }
    }

    pub fn pairing_key(&self) -> PairingKey {
        PairingKey::new(self.pairing_date, self.pairing_name.clone())
    }

    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        calendar::date_run(self.pairing_date, self.num_days)
    }
}

impl PartialEq for FlicaTask {
    fn eq(&self, other: &Self) -> bool {
        self.pairing_name == other.pairing_name
    }
}

impl Eq for FlicaTask {}

impl Hash for FlicaTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pairing_name.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Processing,
    Approved,
    Denied,
}

/// A previously submitted swap and where it stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpentimeRequest {
    pub transition: Transition,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    Success,
    Duplicate,
}

const DUPLICATE_MAGIC: &str = "A duplicate request already exists.";

impl SwapStatus {
    pub fn parse(raw: &str) -> SwapStatus {
        if raw.contains(DUPLICATE_MAGIC) {
            SwapStatus::Duplicate
        } else {
            SwapStatus::Success
        }
    }
}
