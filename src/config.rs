//! Configuration for the solver and the bidding process.
//!
//! Everything here is read-only once loaded. Missing JSON fields fall back
//! to the `Default` values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::{Period, YearMonth};
use crate::error::BidError;
use crate::model::PairingKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BidConfig {
    /// Floor for retained + non-trip + added credit.
    pub minimum_credit: Period,
    pub minimum_retained_trips: usize,
    pub required_days_off: Vec<NaiveDate>,
    pub forced_drops: Vec<PairingKey>,
    pub max_consecutive_days: usize,
    pub max_adds_per_swap: usize,
    /// Extra rest days required around a retained trip.
    pub minimum_days_between_trips: u64,
    pub reroot_on_approved_transition: bool,
    pub max_swaps_per_cycle: usize,
    pub scoring: ScoringConfig,
}

impl Default for BidConfig {
    fn default() -> Self {
        Self {
            minimum_credit: Period::hours(65),
            minimum_retained_trips: 0,
            required_days_off: Vec::new(),
            forced_drops: Vec::new(),
            max_consecutive_days: 5,
            max_adds_per_swap: 2,
            minimum_days_between_trips: 0,
            reroot_on_approved_transition: false,
            max_swaps_per_cycle: 10,
            scoring: ScoringConfig::default(),
        }
    }
}

impl BidConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BidError> {
        read_json(path.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub favorite_overnights: Vec<String>,
    pub despised_overnights: Vec<String>,
    pub favorite_turns: Vec<String>,
    pub despised_turns: Vec<String>,
    pub preferred_origin: Option<String>,
    pub ideal_first_last_day_legs: usize,
    pub ideal_middle_day_legs: usize,
    /// Report must be after this hour...
    pub commutable_report_after_hour: u32,
    /// ...and no later than this one.
    pub commutable_report_until_hour: u32,
    pub commutable_release_by_hour: u32,
    pub enable_efficiency_score: bool,
    pub score_adjustments: Vec<ScoreAdjustment>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            favorite_overnights: Vec::new(),
            despised_overnights: Vec::new(),
            favorite_turns: Vec::new(),
            despised_turns: Vec::new(),
            preferred_origin: None,
            ideal_first_last_day_legs: 3,
            ideal_middle_day_legs: 2,
            commutable_report_after_hour: 9,
            commutable_report_until_hour: 20,
            commutable_release_by_hour: 18,
            enable_efficiency_score: false,
            score_adjustments: Vec::new(),
        }
    }
}

/// A flat bonus or penalty for trips matching a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub condition: AdjustmentCondition,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentCondition {
    /// Any of these employee ids is on the crew.
    Crew(Vec<String>),
    /// The trip touches any of these days of the month.
    SoftDaysOff(Vec<u32>),
    /// Applied once per departure day falling Monday through Friday.
    Weekdays,
    /// Applied once per departure day falling Friday through Sunday.
    Weekends,
}

impl AdjustmentCondition {
    pub fn matches_weekday(&self, day: Weekday) -> bool {
        match self {
            AdjustmentCondition::Weekdays => !matches!(day, Weekday::Sat | Weekday::Sun),
            AdjustmentCondition::Weekends => matches!(day, Weekday::Fri | Weekday::Sat | Weekday::Sun),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    #[default]
    Off,
    Record,
    Replay,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidRound {
    Sap,
    Sbb,
    #[default]
    FirstCome,
}

/// Refresh interval and failure budget for one poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub max_failures_before_sleeping: u32,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BidderConfig {
    pub year_month: YearMonth,
    pub round: BidRound,
    pub domicile: String,
    pub rank: String,
    pub schedule_poller: PollerConfig,
    pub opentime_poller: PollerConfig,
    pub request_poller: PollerConfig,
    pub initial_delay_secs: u64,
    pub failure_interval_secs: u64,
    pub replay: ReplayMode,
    pub replay_dir: PathBuf,
    pub bid: BidConfig,
}

impl Default for BidderConfig {
    fn default() -> Self {
        Self {
            year_month: YearMonth::of(chrono::Local::now().date_naive()),
            round: BidRound::default(),
            domicile: "CLT".to_string(),
            rank: "CA".to_string(),
            schedule_poller: PollerConfig {
                interval_secs: 300,
                max_failures_before_sleeping: 3,
            },
            opentime_poller: PollerConfig {
                interval_secs: 60,
                max_failures_before_sleeping: 5,
            },
            request_poller: PollerConfig {
                interval_secs: 120,
                max_failures_before_sleeping: 3,
            },
            initial_delay_secs: 0,
            failure_interval_secs: 10,
            replay: ReplayMode::Off,
            replay_dir: PathBuf::from("."),
            bid: BidConfig::default(),
        }
    }
}

impl BidderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BidError> {
        read_json(path.as_ref())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn failure_interval(&self) -> Duration {
        Duration::from_secs(self.failure_interval_secs)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, BidError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| BidError::Config(format!("{}: {}", path.display(), e)))
}
