//! Collaborator seams.
//!
//! The bidder never talks to the crew portal directly. A `FlicaService`
//! implementation does the fetching and parsing, which lets the live HTTP
//! client, the recorder and the replayer stand in for each other.

use chrono::NaiveDate;

use crate::calendar::YearMonth;
use crate::config::BidRound;
use crate::error::BidError;
use crate::model::{FlicaTask, OpentimeRequest, PairingKey, Schedule, Trip};

pub trait FlicaService: Send + Sync {
    fn fetch_schedule(&self, year_month: YearMonth) -> Result<Schedule, BidError>;

    /// May fail with `BidError::NotYetAvailable` before the pool is published.
    fn fetch_open_time(
        &self,
        domicile: &str,
        rank: &str,
        round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<FlicaTask>, BidError>;

    fn fetch_opentime_request_statuses(
        &self,
        round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<OpentimeRequest>, BidError>;

    /// Returns the raw response body; see `SwapStatus::parse`.
    fn submit_swap(
        &self,
        round: BidRound,
        year_month: YearMonth,
        today: NaiveDate,
        add_keys: &[PairingKey],
        drop_keys: &[PairingKey],
    ) -> Result<String, BidError>;

    /// Every pairing published for the month.
    fn fetch_pairing_list(&self, year_month: YearMonth) -> Result<Vec<Trip>, BidError>;

    fn fetch_pairing_detail(&self, key: &PairingKey) -> Result<Trip, BidError>;
}
