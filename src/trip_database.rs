//! Pairing cache keyed by `PairingKey`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::calendar::YearMonth;
use crate::error::BidError;
use crate::model::{PairingKey, Schedule, Trip};
use crate::traits::FlicaService;

pub struct TripDatabase {
    service: Arc<dyn FlicaService>,
    trips: Mutex<HashMap<PairingKey, Arc<Trip>>>,
}

impl TripDatabase {
    pub fn new(service: Arc<dyn FlicaService>) -> Self {
        Self {
            service,
            trips: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PairingKey, Arc<Trip>>> {
        match self.trips.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seeds the cache with this month's and last month's pairing lists.
    ///
    /// Last month matters because trips departing at the end of it can
    /// carry into this one.
    ///
    /// Nothing is cached unless both months load cleanly.
    pub fn load_pairings(&self, year_month: YearMonth) -> Result<usize, BidError> {
        let mut loaded = HashMap::new();
        for month in [year_month, year_month.previous()] {
            info!(%month, "loading pairings");
            for trip in self.service.fetch_pairing_list(month)? {
                let key = trip.key.clone();
                if loaded.insert(key.clone(), Arc::new(trip)).is_some() {
                    return Err(BidError::Invariant(format!("duplicate pairing {}", key)));
                }
            }
        }
        let count = loaded.len();
        self.lock().extend(loaded);
        Ok(count)
    }

    /// Modified trips don't show up in the pairing lists.
    pub fn add_trips_from_schedule(&self, schedule: &Schedule) {
        let mut cache = self.lock();
        for (key, trip) in schedule.trips() {
            if !cache.contains_key(key) {
                debug!(%key, "adding trip from schedule");
                cache.insert(key.clone(), Arc::new(trip.clone()));
            }
        }
    }

    pub fn get_trip(&self, key: &PairingKey) -> Result<Arc<Trip>, BidError> {
        if let Some(trip) = self.lock().get(key) {
            return Ok(trip.clone());
        }
        let trip = Arc::new(self.service.fetch_pairing_detail(key)?);
        self.lock().insert(key.clone(), trip.clone());
        Ok(trip)
    }

    pub fn contains(&self, key: &PairingKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
