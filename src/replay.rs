//! Session recording and replay.
//!
//! A recording lives under `<base>/replay-<epoch-ms>/`. Time-series data
//! (schedule, opentime, request statuses) is stored one JSON file per fetch,
//! named by a strictly increasing millisecond timestamp, and read back in the
//! same order. Pairing lists and details are stored under stable names.
//!
//! Only successful fetches are recorded. A failed fetch, including
//! `NotYetAvailable` opentime, leaves no file, so a replay serves the next
//! successful result in its place and never reproduces the failure.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::calendar::YearMonth;
use crate::config::BidRound;
use crate::error::BidError;
use crate::model::{FlicaTask, OpentimeRequest, PairingKey, Schedule, Trip};
use crate::traits::FlicaService;
use crate::transition::Transition;

const REPLAY_PREFIX: &str = "replay-";
const PAIRINGS_DIR: &str = "pairings";
const SWAPS_FILE: &str = "swaps.txt";

/// Body returned for swaps "submitted" during replay.
pub const REPLAYED_SWAP_RESPONSE: &str = "Replayed swap request; nothing was submitted.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayKind {
    Opentime,
    Schedule,
    OpentimeRequests,
}

impl ReplayKind {
    pub const ALL: [ReplayKind; 3] = [
        ReplayKind::Opentime,
        ReplayKind::Schedule,
        ReplayKind::OpentimeRequests,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            ReplayKind::Opentime => "opentime",
            ReplayKind::Schedule => "schedule",
            ReplayKind::OpentimeRequests => "opentime-requests",
        }
    }
}

#[derive(Debug, Default)]
struct Cursors {
    /// Last timestamp written per kind.
    written: HashMap<ReplayKind, i64>,
    /// Last timestamp consumed per kind.
    read: HashMap<ReplayKind, i64>,
}

#[derive(Debug)]
pub struct ReplayManager {
    dir: PathBuf,
    cursors: Mutex<Cursors>,
}

impl ReplayManager {
    /// Starts a new recording session under `base`.
    pub fn record(base: &Path) -> Result<Self, BidError> {
        let dir = base.join(format!("{}{}", REPLAY_PREFIX, Utc::now().timestamp_millis()));
        for kind in ReplayKind::ALL {
            fs::create_dir_all(dir.join(kind.dir_name()))?;
        }
        fs::create_dir_all(dir.join(PAIRINGS_DIR))?;
        info!(dir = %dir.display(), "recording session");
        Ok(Self::open(dir))
    }

    /// Opens the most recent session under `base`.
    pub fn replay_latest(base: &Path) -> Result<Self, BidError> {
        let mut latest: Option<(i64, PathBuf)> = None;
        for entry in fs::read_dir(base)? {
            let path = entry?.path();
            let stamp = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(REPLAY_PREFIX))
                .and_then(|stamp| stamp.parse::<i64>().ok());
            if let Some(stamp) = stamp {
                if path.is_dir() && latest.as_ref().is_none_or(|(best, _)| stamp > *best) {
                    latest = Some((stamp, path));
                }
            }
        }
        match latest {
            Some((_, dir)) => {
                info!(dir = %dir.display(), "replaying session");
                Ok(Self::open(dir))
            }
            None => Err(BidError::Config(format!(
                "no {}* directory under {}",
                REPLAY_PREFIX,
                base.display()
            ))),
        }
    }

    pub fn open(dir: PathBuf) -> Self {
        Self {
            dir,
            cursors: Mutex::new(Cursors::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, Cursors> {
        match self.cursors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn kind_dir(&self, kind: ReplayKind) -> PathBuf {
        self.dir.join(kind.dir_name())
    }

    /// Best-effort; failures are logged.
    pub fn save<T: Serialize>(&self, kind: ReplayKind, data: &T) {
        let stamp = {
            let mut cursors = self.lock();
            let now = Utc::now().timestamp_millis();
            let stamp = match cursors.written.get(&kind) {
                Some(last) if *last >= now => last + 1,
                _ => now,
            };
            cursors.written.insert(kind, stamp);
            stamp
        };
        let path = self.kind_dir(kind).join(format!("{}.json", stamp));
        if let Err(err) = write_json(&path, data) {
            warn!(path = %path.display(), error = %err, "unable to save replay data");
        }
    }

    /// Reads the next file after the last one consumed for `kind`.
    pub fn next<T: DeserializeOwned>(&self, kind: ReplayKind) -> Result<T, BidError> {
        let dir = self.kind_dir(kind);
        let mut cursors = self.lock();
        let after = cursors.read.get(&kind).copied();

        let mut next: Option<i64> = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(stamp) = timestamp_of(&path) else {
                continue;
            };
            if after.is_some_and(|after| stamp <= after) {
                continue;
            }
            if next.is_none_or(|best| stamp < best) {
                next = Some(stamp);
            }
        }

        let Some(stamp) = next else {
            return Err(BidError::ReplayExhausted(dir));
        };
        let path = dir.join(format!("{}.json", stamp));
        debug!(path = %path.display(), "replaying");
        let data = serde_json::from_slice(&fs::read(&path)?)?;
        cursors.read.insert(kind, stamp);
        Ok(data)
    }

    fn pairing_list_path(&self, year_month: YearMonth) -> PathBuf {
        self.dir.join(PAIRINGS_DIR).join(format!("{}.json", year_month))
    }

    fn pairing_detail_path(&self, key: &PairingKey) -> PathBuf {
        self.dir
            .join(PAIRINGS_DIR)
            .join(format!("{}_{}.json", key.date, key.name))
    }

    pub fn save_pairing_list(&self, year_month: YearMonth, trips: &[Trip]) {
        let path = self.pairing_list_path(year_month);
        if let Err(err) = write_json(&path, &trips) {
            warn!(path = %path.display(), error = %err, "unable to save pairing list");
        }
    }

    pub fn pairing_list(&self, year_month: YearMonth) -> Result<Vec<Trip>, BidError> {
        read_keyed(self.pairing_list_path(year_month))
    }

    pub fn save_pairing_detail(&self, trip: &Trip) {
        let path = self.pairing_detail_path(&trip.key);
        if let Err(err) = write_json(&path, trip) {
            warn!(path = %path.display(), error = %err, "unable to save pairing detail");
        }
    }

    pub fn pairing_detail(&self, key: &PairingKey) -> Result<Trip, BidError> {
        read_keyed(self.pairing_detail_path(key))
    }

    /// Appends a line to `swaps.txt`. Best-effort.
    pub fn record_swap(&self, transition: &Transition) {
        let path = self.dir.join(SWAPS_FILE);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{}", transition));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "unable to record swap");
        }
    }

    /// Every swap line recorded so far.
    pub fn swaps(&self) -> Result<Vec<String>, BidError> {
        let path = self.dir.join(SWAPS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(path)?.lines().map(str::to_string).collect())
    }
}

fn timestamp_of(path: &Path) -> Option<i64> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), BidError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(data)?)?;
    Ok(())
}

fn read_keyed<T: DeserializeOwned>(path: PathBuf) -> Result<T, BidError> {
    if !path.exists() {
        return Err(BidError::ReplayExhausted(path));
    }
    Ok(serde_json::from_slice(&fs::read(&path)?)?)
}

/// Passes calls through to a live service and saves what comes back.
pub struct RecordingService {
    inner: Arc<dyn FlicaService>,
    replay: ReplayManager,
}

impl RecordingService {
    pub fn new(inner: Arc<dyn FlicaService>, replay: ReplayManager) -> Self {
        Self { inner, replay }
    }

    pub fn replay(&self) -> &ReplayManager {
        &self.replay
    }
}

impl FlicaService for RecordingService {
    fn fetch_schedule(&self, year_month: YearMonth) -> Result<Schedule, BidError> {
        let schedule = self.inner.fetch_schedule(year_month)?;
        self.replay.save(ReplayKind::Schedule, &schedule);
        Ok(schedule)
    }

    fn fetch_open_time(
        &self,
        domicile: &str,
        rank: &str,
        round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<FlicaTask>, BidError> {
        let tasks = self.inner.fetch_open_time(domicile, rank, round, year_month)?;
        self.replay.save(ReplayKind::Opentime, &tasks);
        Ok(tasks)
    }

    fn fetch_opentime_request_statuses(
        &self,
        round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<OpentimeRequest>, BidError> {
        let requests = self.inner.fetch_opentime_request_statuses(round, year_month)?;
        self.replay.save(ReplayKind::OpentimeRequests, &requests);
        Ok(requests)
    }

    fn submit_swap(
        &self,
        round: BidRound,
        year_month: YearMonth,
        today: NaiveDate,
        add_keys: &[PairingKey],
        drop_keys: &[PairingKey],
    ) -> Result<String, BidError> {
        let response = self
            .inner
            .submit_swap(round, year_month, today, add_keys, drop_keys)?;
        self.replay.record_swap(&Transition::new(
            add_keys.iter().cloned(),
            drop_keys.iter().cloned(),
        ));
        Ok(response)
    }

    fn fetch_pairing_list(&self, year_month: YearMonth) -> Result<Vec<Trip>, BidError> {
        let trips = self.inner.fetch_pairing_list(year_month)?;
        self.replay.save_pairing_list(year_month, &trips);
        Ok(trips)
    }

    fn fetch_pairing_detail(&self, key: &PairingKey) -> Result<Trip, BidError> {
        let trip = self.inner.fetch_pairing_detail(key)?;
        self.replay.save_pairing_detail(&trip);
        Ok(trip)
    }
}

/// Serves a recorded session. Never touches the network.
pub struct ReplayService {
    replay: ReplayManager,
}

impl ReplayService {
    pub fn new(replay: ReplayManager) -> Self {
        Self { replay }
    }

    pub fn replay(&self) -> &ReplayManager {
        &self.replay
    }
}

impl FlicaService for ReplayService {
    fn fetch_schedule(&self, _year_month: YearMonth) -> Result<Schedule, BidError> {
        self.replay.next(ReplayKind::Schedule)
    }

    fn fetch_open_time(
        &self,
        _domicile: &str,
        _rank: &str,
        _round: BidRound,
        _year_month: YearMonth,
    ) -> Result<Vec<FlicaTask>, BidError> {
        self.replay.next(ReplayKind::Opentime)
    }

    fn fetch_opentime_request_statuses(
        &self,
        _round: BidRound,
        _year_month: YearMonth,
    ) -> Result<Vec<OpentimeRequest>, BidError> {
        self.replay.next(ReplayKind::OpentimeRequests)
    }

    fn submit_swap(
        &self,
        _round: BidRound,
        _year_month: YearMonth,
        _today: NaiveDate,
        add_keys: &[PairingKey],
        drop_keys: &[PairingKey],
    ) -> Result<String, BidError> {
        let transition = Transition::new(add_keys.iter().cloned(), drop_keys.iter().cloned());
        info!(%transition, "replay mode, not submitting");
        self.replay.record_swap(&transition);
        Ok(REPLAYED_SWAP_RESPONSE.to_string())
    }

    fn fetch_pairing_list(&self, year_month: YearMonth) -> Result<Vec<Trip>, BidError> {
        self.replay.pairing_list(year_month)
    }

    fn fetch_pairing_detail(&self, key: &PairingKey) -> Result<Trip, BidError> {
        self.replay.pairing_detail(key)
    }
}
