//! Integration tests for the acquisition loop and shared telemetry state

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::RecordingStore;
use fieldnode_core::{
    AcquisitionLoop, BusError, MemoryStore, SamplingPeriod, StateError, TickOutcome,
};

#[tokio::test(start_paused = true)]
async fn tick_writes_calibrated_pair() {
    let (primary, _, _) = common::channel(1, 0x48, 110, true);
    let (secondary, _, _) = common::channel(2, 0x49, 50, true);
    primary.set_offset(10.0);
    let store = Arc::new(MemoryStore::new());
    let state = common::telemetry(store.clone());

    let acquisition = AcquisitionLoop::new(primary, secondary, state.clone(), SamplingPeriod::new(store));
    let outcome = acquisition.tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Written {
            primary: 100.0,
            secondary: 50.0
        }
    );
    let snapshot = state.snapshot().await.unwrap();
    assert_eq!(snapshot.primary_avg, 10.0);
    assert_eq!(snapshot.secondary_avg, 5.0);
    assert_eq!(acquisition.stats().completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn contended_tick_is_skipped_not_blocked() {
    let (primary, _, _) = common::channel(1, 0x48, 100, true);
    let (secondary, second_device, _) = common::channel(2, 0x49, 100, true);
    let store = Arc::new(MemoryStore::new());
    let state = common::telemetry(store.clone());
    let acquisition = AcquisitionLoop::new(primary, secondary, state.clone(), SamplingPeriod::new(store));

    let held = state.try_lock().await.unwrap();
    assert_eq!(acquisition.tick().await, TickOutcome::Skipped);
    drop(held);

    assert_eq!(acquisition.stats().skipped(), 1);
    assert_eq!(acquisition.stats().completed(), 0);
    assert_eq!(second_device.reads(), 0);
    assert_eq!(state.snapshot().await.unwrap().primary_avg, 0.0);
}

#[tokio::test(start_paused = true)]
async fn failing_secondary_holds_last_good_value() {
    let (primary, _, _) = common::channel(1, 0x48, 0, true);
    let (secondary, device, _) = common::channel(2, 0x49, 30, true);
    let store = Arc::new(MemoryStore::new());
    let state = common::telemetry(store.clone());
    let acquisition = AcquisitionLoop::new(primary, secondary, state, SamplingPeriod::new(store));

    acquisition.tick().await;
    device.set_fallback(Err(BusError::Timeout));

    for _ in 0..7 {
        match acquisition.tick().await {
            TickOutcome::Written { secondary, .. } => assert_eq!(secondary, 30.0),
            TickOutcome::Skipped => panic!("uncontended tick skipped"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn run_follows_sampling_period() {
    let (primary, _, _) = common::channel(1, 0x48, 1, true);
    let (secondary, _, _) = common::channel(2, 0x49, 1, true);
    let store = Arc::new(MemoryStore::new());
    let state = common::telemetry(store.clone());
    let period = SamplingPeriod::new(store);
    period.set(100).unwrap();

    let acquisition = AcquisitionLoop::new(primary, secondary, state, period);
    let stats = acquisition.stats();
    let task = tokio::spawn(acquisition.run());

    tokio::time::sleep(Duration::from_millis(350)).await;
    task.abort();

    assert_eq!(stats.completed(), 4);
}

#[tokio::test(start_paused = true)]
async fn repeated_set_persists_same_value() {
    let store = Arc::new(RecordingStore::default());
    let state = common::telemetry(store.clone());

    state.set_relay_pin(25, true).await.unwrap();
    state.set_relay_pin(25, true).await.unwrap();

    assert_eq!(state.relay_states().await.unwrap(), [true, false, false, false]);
    assert_eq!(
        store.writes(),
        vec![
            ("relay0".to_owned(), "true".to_owned()),
            ("relay0".to_owned(), "true".to_owned())
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn relay_write_reports_busy_lock() {
    let state = common::telemetry(Arc::new(MemoryStore::new()));
    let _held = state.try_lock().await.unwrap();

    assert_eq!(
        state.toggle_relay_pin(25).await,
        Err(StateError::LockTimeout { waited_ms: 10 })
    );
}
