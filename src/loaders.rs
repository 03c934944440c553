//! The three pollers: schedule, opentime and opentime request status.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::calendar::YearMonth;
use crate::clock::Clock;
use crate::collector::Collector;
use crate::config::{BidRound, BidderConfig};
use crate::daemon::{PeriodicWork, WorkResult};
use crate::error::BidError;
use crate::model::RequestStatus;
use crate::stats::RuntimeStats;
use crate::traits::FlicaService;
use crate::tree::ScheduleWrapperTree;
use crate::trip_database::TripDatabase;

/// Maps a fetch error to what the poller should do next.
fn classify(poller: &str, err: BidError) -> WorkResult {
    match err {
        BidError::ReplayExhausted(path) => {
            error!(poller, path = %path.display(), "replay data exhausted");
            WorkResult::Halt
        }
        BidError::NotYetAvailable { what, year_month } => {
            info!(poller, %what, %year_month, "not yet available");
            WorkResult::Complete
        }
        err if err.is_transient() => {
            warn!(poller, error = %err, "fetch failed");
            WorkResult::Incomplete
        }
        err => {
            error!(poller, error = %err, "fetch failed");
            WorkResult::Incomplete
        }
    }
}

pub struct ScheduleLoader {
    service: Arc<dyn FlicaService>,
    year_month: YearMonth,
    collector: Arc<Collector>,
    trip_database: Arc<TripDatabase>,
}

impl ScheduleLoader {
    pub fn new(
        service: Arc<dyn FlicaService>,
        year_month: YearMonth,
        collector: Arc<Collector>,
        trip_database: Arc<TripDatabase>,
    ) -> Self {
        Self {
            service,
            year_month,
            collector,
            trip_database,
        }
    }
}

impl PeriodicWork for ScheduleLoader {
    fn name(&self) -> &str {
        "schedule-loader"
    }

    fn do_initial_work(&mut self) {
        match self.trip_database.load_pairings(self.year_month) {
            Ok(count) => info!(poller = self.name(), count, "loaded pairings"),
            Err(err) => warn!(poller = self.name(), error = %err, "unable to load pairings"),
        }
    }

    fn do_periodic_work(&mut self) -> WorkResult {
        info!(poller = self.name(), "refreshing schedule");
        match self.service.fetch_schedule(self.year_month) {
            Ok(schedule) => {
                self.trip_database.add_trips_from_schedule(&schedule);
                info!(poller = self.name(), %schedule, "schedule refreshed");
                self.collector.offer_schedule(Arc::new(schedule));
                WorkResult::Complete
            }
            Err(err) => classify(self.name(), err),
        }
    }
}

pub struct OpentimeLoader {
    service: Arc<dyn FlicaService>,
    domicile: String,
    rank: String,
    round: BidRound,
    year_month: YearMonth,
    collector: Arc<Collector>,
    stats: Arc<RuntimeStats>,
    clock: Arc<dyn Clock>,
}

impl OpentimeLoader {
    pub fn new(
        service: Arc<dyn FlicaService>,
        config: &BidderConfig,
        collector: Arc<Collector>,
        stats: Arc<RuntimeStats>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            domicile: config.domicile.clone(),
            rank: config.rank.clone(),
            round: config.round,
            year_month: config.year_month,
            collector,
            stats,
            clock,
        }
    }
}

impl PeriodicWork for OpentimeLoader {
    fn name(&self) -> &str {
        "opentime-loader"
    }

    fn do_periodic_work(&mut self) -> WorkResult {
        info!(poller = self.name(), "refreshing opentime");
        let result = self
            .service
            .fetch_open_time(&self.domicile, &self.rank, self.round, self.year_month);
        match result {
            Ok(tasks) => {
                info!(poller = self.name(), tasks = tasks.len(), "opentime refreshed");
                self.stats.record_opentime_refresh(self.clock.now());
                self.collector.offer_tasks(tasks);
                WorkResult::Complete
            }
            Err(err) => classify(self.name(), err),
        }
    }
}

pub struct OpentimeRequestLoader {
    service: Arc<dyn FlicaService>,
    round: BidRound,
    year_month: YearMonth,
    tree: Arc<ScheduleWrapperTree>,
}

impl OpentimeRequestLoader {
    pub fn new(
        service: Arc<dyn FlicaService>,
        round: BidRound,
        year_month: YearMonth,
        tree: Arc<ScheduleWrapperTree>,
    ) -> Self {
        Self {
            service,
            round,
            year_month,
            tree,
        }
    }
}

impl PeriodicWork for OpentimeRequestLoader {
    fn name(&self) -> &str {
        "opentime-request-loader"
    }

    fn do_periodic_work(&mut self) -> WorkResult {
        info!(poller = self.name(), "refreshing opentime requests");
        let requests = match self
            .service
            .fetch_opentime_request_statuses(self.round, self.year_month)
        {
            Ok(requests) => requests,
            Err(err) => return classify(self.name(), err),
        };
        for request in requests {
            match request.status {
                RequestStatus::Approved => {
                    self.tree.mark_approved(&request.transition);
                }
                RequestStatus::Denied => {
                    self.tree.mark_denied(&request.transition);
                }
                RequestStatus::Pending | RequestStatus::Processing => {}
            }
        }
        WorkResult::Complete
    }
}
