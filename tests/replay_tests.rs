//! Record/replay tests
//!
//! A recorded session must play back the same snapshots in the same order
//! without touching the live service, and stop hard when it runs out.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use crew_bidder::collector::Collector;
use crew_bidder::config::BidRound;
use crew_bidder::daemon::{self, DaemonSchedule, InitialRunLatch};
use crew_bidder::error::BidError;
use crew_bidder::loaders::ScheduleLoader;
use crew_bidder::model::{OpentimeRequest, RequestStatus, SwapStatus};
use crew_bidder::replay::{RecordingService, ReplayManager, ReplayService};
use crew_bidder::traits::FlicaService;
use crew_bidder::transition::Transition;
use crew_bidder::trip_database::TripDatabase;

use fixtures::{date, ym, FakeFlicaService, ScheduleBuilder, TripBuilder};

fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap()
}

/// Records two schedule and two opentime fetches, returning what was seen.
fn record_session(base: &std::path::Path) -> (Vec<String>, Vec<String>) {
    let live = Arc::new(FakeFlicaService::new());
    let recorder = RecordingService::new(live.clone(), ReplayManager::record(base).unwrap());

    let mut schedules = Vec::new();
    let mut opentime = Vec::new();

    live.set_schedule(
        ScheduleBuilder::new()
            .trip(TripBuilder::new("L1", 5).days(3).layover("BUF"))
            .build(),
    );
    live.set_opentime(vec![TripBuilder::new("T1", 20).days(2).task(15)]);
    schedules.push(json(&recorder.fetch_schedule(ym()).unwrap()));
    opentime.push(json(&recorder.fetch_open_time("CLT", "CA", BidRound::FirstCome, ym()).unwrap()));

    live.set_schedule(
        ScheduleBuilder::new()
            .trip(TripBuilder::new("L1", 5).days(3).layover("BUF"))
            .trip(TripBuilder::new("T1", 20).days(2))
            .build(),
    );
    live.set_opentime(vec![]);
    schedules.push(json(&recorder.fetch_schedule(ym()).unwrap()));
    opentime.push(json(&recorder.fetch_open_time("CLT", "CA", BidRound::FirstCome, ym()).unwrap()));

    (schedules, opentime)
}

#[test]
fn test_replay_reproduces_recorded_snapshots_in_order() {
    let base = tempfile::tempdir().unwrap();
    let (schedules, opentime) = record_session(base.path());

    let replayer = ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap());
    for expected in &schedules {
        assert_eq!(&json(&replayer.fetch_schedule(ym()).unwrap()), expected);
    }
    for expected in &opentime {
        let tasks = replayer
            .fetch_open_time("CLT", "CA", BidRound::FirstCome, ym())
            .unwrap();
        assert_eq!(&json(&tasks), expected);
    }
}

#[test]
fn test_exhausted_stream_is_an_error() {
    let base = tempfile::tempdir().unwrap();
    record_session(base.path());

    let replayer = ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap());
    replayer.fetch_schedule(ym()).unwrap();
    replayer.fetch_schedule(ym()).unwrap();
    let err = replayer.fetch_schedule(ym()).unwrap_err();
    assert!(matches!(err, BidError::ReplayExhausted(_)));
    assert!(!err.is_transient());

    // Nothing was recorded for request statuses at all.
    assert!(matches!(
        replayer.fetch_opentime_request_statuses(BidRound::FirstCome, ym()),
        Err(BidError::ReplayExhausted(_))
    ));
}

#[test]
fn test_pairings_replay_by_key() {
    let base = tempfile::tempdir().unwrap();
    let live = Arc::new(FakeFlicaService::new());
    let t1 = TripBuilder::new("T1", 20).days(2);
    live.add_pairing(t1.build());
    live.add_pairing(TripBuilder::new("T2", 22).days(1).build());

    let recorder = RecordingService::new(live, ReplayManager::record(base.path()).unwrap());
    let listed = recorder.fetch_pairing_list(ym()).unwrap();
    let detail = recorder.fetch_pairing_detail(&t1.key()).unwrap();

    let replayer = ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap());
    assert_eq!(replayer.fetch_pairing_list(ym()).unwrap(), listed);
    assert_eq!(replayer.fetch_pairing_detail(&t1.key()).unwrap(), detail);
    // Pairing lookups are not a stream; asking twice works.
    assert_eq!(replayer.fetch_pairing_detail(&t1.key()).unwrap(), detail);
    assert!(matches!(
        replayer.fetch_pairing_detail(&TripBuilder::new("T2", 22).key()),
        Err(BidError::ReplayExhausted(_))
    ));
}

#[test]
fn test_replayed_swaps_are_logged_not_submitted() {
    let base = tempfile::tempdir().unwrap();
    record_session(base.path());
    let replayer = ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap());

    let add = TripBuilder::new("T1", 20).key();
    let drop = TripBuilder::new("L1", 5).key();
    let raw = replayer
        .submit_swap(BidRound::FirstCome, ym(), date(1), &[add.clone()], &[drop.clone()])
        .unwrap();
    assert_eq!(SwapStatus::parse(&raw), SwapStatus::Success);

    let swaps = replayer.replay().swaps().unwrap();
    assert_eq!(swaps, vec![Transition::new(vec![add], vec![drop]).to_string()]);
}

#[test]
fn test_recorded_request_statuses_round_trip() {
    let base = tempfile::tempdir().unwrap();
    let live = Arc::new(FakeFlicaService::new());
    let request = OpentimeRequest {
        transition: Transition::new(
            vec![TripBuilder::new("T1", 20).key()],
            vec![TripBuilder::new("L1", 5).key()],
        ),
        status: RequestStatus::Denied,
    };
    live.set_requests(vec![request.clone()]);

    let recorder = RecordingService::new(live, ReplayManager::record(base.path()).unwrap());
    recorder
        .fetch_opentime_request_statuses(BidRound::FirstCome, ym())
        .unwrap();

    let replayer = ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap());
    let replayed = replayer
        .fetch_opentime_request_statuses(BidRound::FirstCome, ym())
        .unwrap();
    assert_eq!(replayed, vec![request]);
}

#[test]
fn test_failed_fetches_are_not_recorded() {
    let base = tempfile::tempdir().unwrap();
    let live = Arc::new(FakeFlicaService::new());
    let recorder = RecordingService::new(live.clone(), ReplayManager::record(base.path()).unwrap());

    live.unpublish_opentime();
    assert!(matches!(
        recorder.fetch_open_time("CLT", "CA", BidRound::FirstCome, ym()),
        Err(BidError::NotYetAvailable { .. })
    ));
    live.publish_opentime();
    live.set_opentime(vec![TripBuilder::new("T1", 20).days(2).task(15)]);
    let published = recorder
        .fetch_open_time("CLT", "CA", BidRound::FirstCome, ym())
        .unwrap();

    let replayer = ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap());
    let first = replayer
        .fetch_open_time("CLT", "CA", BidRound::FirstCome, ym())
        .unwrap();
    assert_eq!(json(&first), json(&published));
    assert!(matches!(
        replayer.fetch_open_time("CLT", "CA", BidRound::FirstCome, ym()),
        Err(BidError::ReplayExhausted(_))
    ));
}

#[test]
fn test_schedule_poller_halts_when_replay_runs_out() {
    let base = tempfile::tempdir().unwrap();
    record_session(base.path());
    let replayer: Arc<dyn FlicaService> =
        Arc::new(ReplayService::new(ReplayManager::replay_latest(base.path()).unwrap()));

    let collector = Arc::new(Collector::new());
    let trip_database = Arc::new(TripDatabase::new(replayer.clone()));
    let loader = ScheduleLoader::new(replayer, ym(), collector.clone(), trip_database.clone());
    let schedule = DaemonSchedule {
        initial_delay: Duration::ZERO,
        interval: Duration::ZERO,
        failure_interval: Duration::ZERO,
        max_failures_before_sleeping: 3,
    };
    let latch = InitialRunLatch::new();

    // Returns only because the third fetch halts the poller.
    daemon::run(loader, schedule, &latch);

    assert!(latch.is_open());
    assert!(trip_database.contains(&TripBuilder::new("T1", 20).key()));
    assert!(trip_database.contains(&TripBuilder::new("L1", 5).key()));
}
