//! Contract Test: Disposal Determinism
//!
//! Dispose is terminal and complete.
//!
//! Constraints verified:
//! - The polling task exits and no callback fires afterwards
//! - Dispose is idempotent and never hangs
//! - Dropping a watcher cancels its polling task
//! - The last snapshot stays readable after dispose

mod common;

use common::*;
use setwatch_core::WatcherState;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn dispose_stops_polling_and_callbacks() {
    let store = ControlledStore::new(Some(AppSettings::new("app", 10)));
    let recorder = ChangeRecorder::new();
    let watcher = spawn_watcher(store.clone(), "app", &recorder);
    assert!(watcher.wait_for_startup(Duration::from_secs(5)).await.unwrap());

    watcher.dispose().await;
    assert!(!watcher.is_running());
    assert_eq!(watcher.state(), WatcherState::Disposed);

    let calls_after_dispose = store.find_call_count();
    store.set(Some(AppSettings::new("app", 99)));
    let_cycles_run(5).await;

    assert_eq!(recorder.count(), 1, "no callback after dispose");
    assert_eq!(store.find_call_count(), calls_after_dispose, "no lookups after dispose");
    assert_eq!(watcher.get_settings().unwrap().max_connections, 10);
}

#[tokio::test]
async fn dispose_twice_is_safe() {
    let store = ControlledStore::new(None);
    let recorder = ChangeRecorder::new();
    let watcher = spawn_watcher(store, "app", &recorder);

    watcher.dispose().await;

    let second = tokio::time::timeout(Duration::from_secs(1), watcher.dispose()).await;
    assert!(second.is_ok(), "second dispose must return immediately");
    assert_eq!(watcher.state(), WatcherState::Disposed);
}

#[tokio::test]
async fn dispose_before_startup_completes() {
    let recorder = ChangeRecorder::new();
    let watcher = setwatch_core::SettingsWatcher::with_options(
        Arc::new(HangingStore),
        "app",
        recorder.callback(),
        fast_options(),
    )
    .unwrap();

    let start = Instant::now();
    watcher.dispose().await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!watcher.is_running());
    assert!(!watcher.is_faulted(), "a disposed watcher is not faulted");
}

#[tokio::test]
async fn get_settings_async_returns_on_dispose() {
    let store = ControlledStore::new(None);
    let recorder = ChangeRecorder::new();
    let watcher = Arc::new(spawn_watcher(store, "missing", &recorder));

    let waiter = Arc::clone(&watcher);
    let pending = tokio::spawn(async move {
        waiter
            .get_settings_async(tokio_util::sync::CancellationToken::new())
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.dispose().await;

    let settings = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("waiter should notice dispose")
        .unwrap();
    assert!(settings.is_none());
}

#[tokio::test]
async fn drop_cancels_polling_task() {
    let store = ControlledStore::new(Some(AppSettings::new("app", 10)));
    let recorder = ChangeRecorder::new();
    let watcher = spawn_watcher(store.clone(), "app", &recorder);
    assert!(watcher.wait_for_startup(Duration::from_secs(5)).await.unwrap());

    drop(watcher);

    // Let an in-flight cycle finish, then expect silence
    tokio::time::sleep(Duration::from_millis(30)).await;
    let calls = store.find_call_count();
    let_cycles_run(5).await;

    assert_eq!(store.find_call_count(), calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_dispose_from_plain_thread() {
    let store = ControlledStore::new(Some(AppSettings::new("app", 10)));
    let recorder = ChangeRecorder::new();
    let watcher = Arc::new(spawn_watcher(store.clone(), "app", &recorder));
    assert!(watcher.wait_for_startup(Duration::from_secs(5)).await.unwrap());

    let blocking = Arc::clone(&watcher);
    tokio::task::spawn_blocking(move || {
        blocking.dispose_blocking();
        blocking.dispose_blocking();
    })
    .await
    .expect("blocking dispose completes");

    assert_eq!(watcher.state(), WatcherState::Disposed);
    let calls = store.find_call_count();
    let_cycles_run(3).await;
    assert_eq!(store.find_call_count(), calls);
}
