//! Test fixtures for crew-bidder.
//!
//! Provides:
//! - Builders for trips, schedules and opentime tasks in October 2019
//! - An in-memory `FlicaService` that records submitted swaps

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crew_bidder::calendar::{Period, YearMonth};
use crew_bidder::config::BidRound;
use crew_bidder::error::BidError;
use crew_bidder::model::{
    Equipment, FlicaTask, Leg, LegActivity, OpentimeRequest, PairingKey, Schedule, Section, Trip,
};
use crew_bidder::traits::FlicaService;
use crew_bidder::transition::Transition;

pub const DUPLICATE_RESPONSE: &str = "Error: A duplicate request already exists.";

pub fn ym() -> YearMonth {
    YearMonth::new(2019, 10).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 10, day).unwrap()
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    date(day).and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
}

/// Builder for trips with one CLT turn per day and sensible defaults.
#[derive(Clone, Debug)]
pub struct TripBuilder {
    name: String,
    first_day: u32,
    days: u32,
    credit_per_day: Period,
    layover: Option<String>,
    activity: LegActivity,
    crew: Vec<String>,
}

impl TripBuilder {
    pub fn new(name: &str, first_day: u32) -> Self {
        Self {
            name: name.to_string(),
            first_day,
            days: 1,
            credit_per_day: Period::hours(5),
            layover: None,
            activity: LegActivity::Flying,
            crew: Vec::new(),
        }
    }

    pub fn days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    pub fn credit_per_day(mut self, hours: i64) -> Self {
        self.credit_per_day = Period::hours(hours);
        self
    }

    pub fn layover(mut self, airport: &str) -> Self {
        self.layover = Some(airport.to_string());
        self
    }

    /// Marks the trip as company business, which can't be dropped.
    pub fn undroppable(mut self) -> Self {
        self.activity = LegActivity::CompanyBusiness;
        self
    }

    pub fn crew(mut self, employee_id: &str) -> Self {
        self.crew.push(employee_id.to_string());
        self
    }

    pub fn key(&self) -> PairingKey {
        PairingKey::new(date(self.first_day), self.name.as_str())
    }

    pub fn build(&self) -> Trip {
        let last = self.first_day + self.days - 1;
        let sections = (self.first_day..=last)
            .map(|day| {
                let overnight = if day == last { None } else { self.layover.clone() };
                let destination = overnight.clone().unwrap_or_else(|| "GSP".to_string());
                let legs = vec![
                    Leg {
                        departure_airport: "CLT".to_string(),
                        arrival_airport: destination.clone(),
                        departure: at(day, 10),
                        arrival: at(day, 12),
                        block: Period::hours(2),
                        equipment: Some(Equipment::Rj9),
                        activity: self.activity,
                    },
                    Leg {
                        departure_airport: destination,
                        arrival_airport: "CLT".to_string(),
                        departure: at(day, 13),
                        arrival: at(day, 15),
                        block: Period::hours(2),
                        equipment: Some(Equipment::Rj9),
                        activity: self.activity,
                    },
                ];
                Section {
                    date: date(day),
                    legs,
                    layover_airport: overnight,
                    layover_duration: Period::ZERO,
                    block: Period::hours(4),
                    credit: self.credit_per_day,
                    duty: Period::hours(7),
                    duty_start: at(day, 10),
                    duty_end: at(day, 17),
                }
            })
            .collect();
        Trip::new(self.key(), sections, self.crew.clone())
    }

    /// The opentime offer for this trip, crediting `total_hours`.
    pub fn task(&self, total_hours: i64) -> FlicaTask {
        FlicaTask::new(self.key(), Period::hours(total_hours), self.days)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ScheduleBuilder {
    trips: Vec<Trip>,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(mut self, trip: TripBuilder) -> Self {
        self.trips.push(trip.build());
        self
    }

    pub fn build(self) -> Schedule {
        Schedule::new(ym(), self.trips, Vec::new())
    }
}

#[derive(Debug, Default)]
struct FakeState {
    schedule: Option<Schedule>,
    opentime: Vec<FlicaTask>,
    requests: Vec<OpentimeRequest>,
    pairings: Vec<Trip>,
    submitted: Vec<Transition>,
    seen: HashSet<Transition>,
    always_duplicate: bool,
    fail_submissions: bool,
    opentime_unpublished: bool,
}

/// In-memory portal. Resubmitting a swap answers with the duplicate message.
#[derive(Debug, Default)]
pub struct FakeFlicaService {
    state: Mutex<FakeState>,
}

impl FakeFlicaService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_schedule(&self, schedule: Schedule) {
        self.state.lock().unwrap().schedule = Some(schedule);
    }

    pub fn set_opentime(&self, tasks: Vec<FlicaTask>) {
        self.state.lock().unwrap().opentime = tasks;
    }

    pub fn set_requests(&self, requests: Vec<OpentimeRequest>) {
        self.state.lock().unwrap().requests = requests;
    }

    pub fn add_pairing(&self, trip: Trip) {
        self.state.lock().unwrap().pairings.push(trip);
    }

    pub fn always_duplicate(&self) {
        self.state.lock().unwrap().always_duplicate = true;
    }

    pub fn fail_submissions(&self) {
        self.state.lock().unwrap().fail_submissions = true;
    }

    pub fn unpublish_opentime(&self) {
        self.state.lock().unwrap().opentime_unpublished = true;
    }

    pub fn publish_opentime(&self) {
        self.state.lock().unwrap().opentime_unpublished = false;
    }

    pub fn submitted(&self) -> Vec<Transition> {
        self.state.lock().unwrap().submitted.clone()
    }
}

impl FlicaService for FakeFlicaService {
    fn fetch_schedule(&self, year_month: YearMonth) -> Result<Schedule, BidError> {
        self.state
            .lock()
            .unwrap()
            .schedule
            .clone()
            .ok_or_else(|| BidError::Fetch(format!("no schedule for {}", year_month)))
    }

    fn fetch_open_time(
        &self,
        _domicile: &str,
        _rank: &str,
        _round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<FlicaTask>, BidError> {
        let state = self.state.lock().unwrap();
        if state.opentime_unpublished {
            return Err(BidError::NotYetAvailable {
                what: "opentime".to_string(),
                year_month: year_month.to_string(),
            });
        }
        Ok(state.opentime.clone())
    }

    fn fetch_opentime_request_statuses(
        &self,
        _round: BidRound,
        _year_month: YearMonth,
    ) -> Result<Vec<OpentimeRequest>, BidError> {
        Ok(self.state.lock().unwrap().requests.clone())
    }

    fn submit_swap(
        &self,
        _round: BidRound,
        _year_month: YearMonth,
        _today: NaiveDate,
        add_keys: &[PairingKey],
        drop_keys: &[PairingKey],
    ) -> Result<String, BidError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(BidError::Fetch("portal unavailable".to_string()));
        }
        let transition = Transition::new(add_keys.iter().cloned(), drop_keys.iter().cloned());
        if state.always_duplicate || !state.seen.insert(transition.clone()) {
            return Ok(DUPLICATE_RESPONSE.to_string());
        }
        state.submitted.push(transition);
        Ok("Request submitted.".to_string())
    }

    fn fetch_pairing_list(&self, year_month: YearMonth) -> Result<Vec<Trip>, BidError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pairings
            .iter()
            .filter(|trip| year_month.contains(trip.key.date))
            .cloned()
            .collect())
    }

    fn fetch_pairing_detail(&self, key: &PairingKey) -> Result<Trip, BidError> {
        self.state
            .lock()
            .unwrap()
            .pairings
            .iter()
            .find(|trip| trip.key == *key)
            .cloned()
            .ok_or_else(|| BidError::UnknownPairing(key.clone()))
    }
}
