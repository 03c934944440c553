//! Process wiring: three pollers feeding one worker.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::info;

use crate::clock::Clock;
use crate::collector::Collector;
use crate::config::{BidderConfig, ReplayMode};
use crate::daemon::{DaemonHandle, DaemonSchedule, PeriodicDaemon};
use crate::error::BidError;
use crate::loaders::{OpentimeLoader, OpentimeRequestLoader, ScheduleLoader};
use crate::replay::{RecordingService, ReplayManager, ReplayService};
use crate::stats::RuntimeStats;
use crate::traits::FlicaService;
use crate::tree::ScheduleWrapperTree;
use crate::trip_database::TripDatabase;
use crate::worker::Worker;

/// Picks the service the pollers talk to.
///
/// Replay mode never touches `live`.
pub fn service_for_mode(
    config: &BidderConfig,
    live: Arc<dyn FlicaService>,
) -> Result<Arc<dyn FlicaService>, BidError> {
    let service: Arc<dyn FlicaService> = match config.replay {
        ReplayMode::Off => live,
        ReplayMode::Record => Arc::new(RecordingService::new(
            live,
            ReplayManager::record(&config.replay_dir)?,
        )),
        ReplayMode::Replay => Arc::new(ReplayService::new(ReplayManager::replay_latest(
            &config.replay_dir,
        )?)),
    };
    Ok(service)
}

pub struct AutoBidder {
    pollers: Vec<DaemonHandle>,
    worker: JoinHandle<()>,
    tree: Arc<ScheduleWrapperTree>,
    trip_database: Arc<TripDatabase>,
    stats: Arc<RuntimeStats>,
}

impl AutoBidder {
    /// Starts everything. Returns once the first schedule has been fetched
    /// and the worker is running.
    pub fn start(
        config: BidderConfig,
        live: Arc<dyn FlicaService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BidError> {
        let service = service_for_mode(&config, live)?;
        let collector = Arc::new(Collector::new());
        let tree = Arc::new(ScheduleWrapperTree::new(config.bid.reroot_on_approved_transition));
        let trip_database = Arc::new(TripDatabase::new(service.clone()));
        let stats = Arc::new(RuntimeStats::new());

        info!(
            year_month = %config.year_month,
            round = ?config.round,
            replay = ?config.replay,
            "starting bidder"
        );

        let schedule_poller = PeriodicDaemon::spawn(
            ScheduleLoader::new(
                service.clone(),
                config.year_month,
                collector.clone(),
                trip_database.clone(),
            ),
            DaemonSchedule::for_poller(&config, &config.schedule_poller),
        )?;
        schedule_poller.wait_for_initial_run();
        info!(pairings = trip_database.len(), "initial schedule loaded");

        let opentime_poller = PeriodicDaemon::spawn(
            OpentimeLoader::new(
                service.clone(),
                &config,
                collector.clone(),
                stats.clone(),
                clock.clone(),
            ),
            DaemonSchedule::for_poller(&config, &config.opentime_poller),
        )?;
        let request_poller = PeriodicDaemon::spawn(
            OpentimeRequestLoader::new(service.clone(), config.round, config.year_month, tree.clone()),
            DaemonSchedule::for_poller(&config, &config.request_poller),
        )?;

        let worker = Worker::new(
            service,
            collector,
            tree.clone(),
            trip_database.clone(),
            stats.clone(),
            clock,
            config.bid.clone(),
            config.year_month,
            config.round,
        )
        .spawn()?;

        Ok(Self {
            pollers: vec![schedule_poller, opentime_poller, request_poller],
            worker,
            tree,
            trip_database,
            stats,
        })
    }

    pub fn pollers(&self) -> &[DaemonHandle] {
        &self.pollers
    }

    pub fn tree(&self) -> &Arc<ScheduleWrapperTree> {
        &self.tree
    }

    pub fn trip_database(&self) -> &Arc<TripDatabase> {
        &self.trip_database
    }

    pub fn stats(&self) -> &Arc<RuntimeStats> {
        &self.stats
    }

    /// Blocks until the worker exits, which it only does by panicking.
    pub fn join(self) -> std::thread::Result<()> {
        self.worker.join()
    }
}
