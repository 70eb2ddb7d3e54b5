//! Integration tests for the worker pool orchestrator.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use futures::StreamExt;
use para::config::MapConfig;
use para::error::Error;
use para::log::LogSink;
use para::model::{Level, WorkerState};
use para::{map, map_with};

#[derive(Default)]
struct Recorder(Mutex<Vec<(Level, String)>>);

impl Recorder {
    fn messages(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl LogSink for Recorder {
    fn log(&self, level: Level, message: &str) {
        self.0.lock().unwrap().push((level, message.to_string()));
    }
}

fn config(pool_size: usize) -> MapConfig {
    MapConfig {
        output_poll: Duration::from_millis(20),
        log_poll: Duration::from_millis(20),
        ..MapConfig::with_pool_size(Some(pool_size))
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_files_two_workers_deliver_every_line() {
    let items = vec!["a.xml".to_string(), "b.xml".to_string()];
    let stream = map(
        |x: String| vec![Ok::<_, String>(format!("{x}-line1")), Ok(format!("{x}-line2"))],
        items,
        Some(2),
    )
    .unwrap();
    assert_eq!(stream.pool_size(), 2);

    let values = stream.collect_values().await.unwrap();
    assert_eq!(values.len(), 4);
    let got: HashSet<String> = values.into_iter().collect();
    let want: HashSet<String> = ["a.xml-line1", "a.xml-line2", "b.xml-line1", "b.xml-line2"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(got, want);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_value_is_delivered_exactly_once() {
    let stream = map(
        |x: u32| (0..3).map(move |k| Ok::<_, String>(x * 10 + k)),
        0..200u32,
        Some(4),
    )
    .unwrap();

    let mut values = stream.collect_values().await.unwrap();
    values.sort_unstable();
    let mut want: Vec<u32> = (0..200u32)
        .flat_map(|x| (0..3).map(move |k| x * 10 + k))
        .collect();
    want.sort_unstable();
    assert_eq!(values, want);
}

#[tokio::test]
async fn single_item_keeps_emission_order() {
    let stream = map(
        |_: u32| vec![Ok::<_, String>("v1"), Ok("v2"), Ok("v3")],
        vec![7u32],
        Some(1),
    )
    .unwrap();
    assert_eq!(stream.collect_values().await.unwrap(), vec!["v1", "v2", "v3"]);
}

#[tokio::test]
async fn pool_never_exceeds_item_count() {
    let mut stream = map(|x: u32| vec![Ok::<_, String>(x)], vec![1u32, 2, 3], Some(64)).unwrap();
    assert_eq!(stream.pool_size(), 3);

    while let Some(value) = stream.next().await {
        value.unwrap();
    }
    assert_eq!(stream.reports().len(), 3);
}

#[tokio::test]
async fn zero_requested_workers_still_runs_one() {
    let stream = map(|x: u32| vec![Ok::<_, String>(x)], vec![1u32, 2], Some(0)).unwrap();
    assert_eq!(stream.pool_size(), 1);
    assert_eq!(stream.collect_values().await.unwrap(), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workers_run_in_parallel() {
    // Every item blocks until all four are being processed at once.
    let barrier = Arc::new(Barrier::new(4));
    let stream = map(
        move |x: u32| {
            barrier.wait();
            vec![Ok::<_, String>(x)]
        },
        0..4u32,
        Some(4),
    )
    .unwrap();

    let values = tokio::time::timeout(Duration::from_secs(10), stream.collect_values())
        .await
        .expect("workers did not overlap")
        .unwrap();
    assert_eq!(values.len(), 4);
}

#[tokio::test]
async fn into_stream_yields_all_values() {
    let stream = map(|x: u32| vec![Ok::<_, String>(x + 1)], vec![1u32, 2, 3], Some(2)).unwrap();
    let mut values: Vec<u32> = stream
        .into_stream()
        .map(|v| v.unwrap())
        .collect()
        .await;
    values.sort_unstable();
    assert_eq!(values, vec![2, 3, 4]);
}

// ---------------------------------------------------------------------------
// Empty input and empty output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_input_yields_empty_sequence() {
    let mut stream = map(|x: u32| vec![Ok::<_, String>(x)], Vec::<u32>::new(), None).unwrap();
    assert_eq!(stream.pool_size(), 0);
    assert!(stream.is_finished());
    assert!(stream.next().await.is_none());
    assert!(stream.reports().is_empty());
}

#[tokio::test]
async fn routine_without_output_terminates() {
    let mut stream = map(
        |_: u32| Vec::<Result<u32, String>>::new(),
        0..5u32,
        Some(3),
    )
    .unwrap();

    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
    let reports = stream.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.state == WorkerState::Drained));
    assert_eq!(reports.iter().map(|r| r.stats.len()).sum::<usize>(), 5);
    assert_eq!(reports.iter().map(|r| r.values()).sum::<usize>(), 0);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

fn fails_on_three(x: u32) -> Vec<Result<u32, String>> {
    if x == 3 {
        vec![Err(format!("cannot process {x}"))]
    } else {
        vec![Ok(x * 10)]
    }
}

#[tokio::test]
async fn failure_is_raised_after_earlier_values() {
    let recorder = Arc::new(Recorder::default());
    let mut stream = map_with(fails_on_three, 1..=5u32, &config(1), recorder.clone()).unwrap();

    let mut values = Vec::new();
    let err = loop {
        match stream.next().await {
            Some(Ok(v)) => values.push(v),
            Some(Err(e)) => break e,
            None => panic!("sequence ended without the failure"),
        }
    };

    // One worker, FIFO queue: 1 and 2 succeed, 3 stops the worker.
    assert_eq!(values, vec![10, 20]);
    assert!(matches!(err, Error::Process { .. }));
    assert!(err.to_string().contains("cannot process 3"));
    assert_eq!(
        std::error::Error::source(&err).unwrap().to_string(),
        "cannot process 3"
    );

    // The sequence is over after the failure.
    assert!(stream.next().await.is_none());
    let reports = stream.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, WorkerState::Failed);
    assert_eq!(reports[0].stats.len(), 2);

    let errors = recorder.messages(Level::Error);
    assert!(errors.iter().any(|m| m == "Mapper 0: An error occurred while processing 3"));
    assert!(errors.iter().any(|m| m.contains("caused by: cannot process 3")));
}

#[tokio::test]
async fn collect_values_stops_at_failure() {
    let result = map(fails_on_three, 1..=5u32, Some(2))
        .unwrap()
        .collect_values()
        .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("cannot process 3"));
}

#[tokio::test]
async fn only_the_first_failure_reaches_the_caller() {
    let mut stream = map(
        |x: u32| vec![Err::<u32, _>(format!("bad {x}"))],
        0..4u32,
        Some(4),
    )
    .unwrap();

    let mut failures = 0;
    while let Some(value) = stream.next().await {
        assert!(value.is_err());
        failures += 1;
    }
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn failure_is_not_held_back_by_a_slow_sibling() {
    let mut stream = map(
        |x: u32| -> Vec<Result<u32, String>> {
            if x == 0 {
                return vec![Err("bad 0".to_string())];
            }
            // Long item that emits nothing.
            std::thread::sleep(Duration::from_secs(2));
            Vec::new()
        },
        vec![0u32, 1],
        Some(2),
    )
    .unwrap();

    let start = std::time::Instant::now();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(err.to_string().contains("bad 0"));
    assert!(stream.is_finished());

    let reports = stream.shutdown().await;
    assert_eq!(reports.len(), 2);
    let failed = reports
        .iter()
        .filter(|r| r.state == WorkerState::Failed)
        .count();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn panicking_routine_is_contained() {
    let mut stream = map(
        |x: u32| -> Vec<Result<u32, String>> {
            if x == 2 {
                panic!("exploded on {x}");
            }
            vec![Ok(x)]
        },
        vec![2u32],
        Some(1),
    )
    .unwrap();

    match stream.next().await {
        Some(Err(Error::Panic { worker, message, .. })) => {
            assert_eq!(worker, "Mapper 0");
            assert_eq!(message, "exploded on 2");
        }
        other => panic!("expected a contained panic, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_cancels_remaining_work() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let mut stream = map(
        move |x: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            vec![Ok::<_, String>(x)]
        },
        0..5_000u32,
        Some(2),
    )
    .unwrap();

    for _ in 0..3 {
        stream.next().await.unwrap().unwrap();
    }
    let reports = stream.shutdown().await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.state == WorkerState::Cancelled));
    assert!(processed.load(Ordering::SeqCst) < 5_000);
}

#[tokio::test]
async fn dropping_the_stream_stops_the_workers() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let mut stream = map(
        move |x: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            vec![Ok::<_, String>(x)]
        },
        0..100_000u32,
        Some(2),
    )
    .unwrap();

    stream.next().await.unwrap().unwrap();
    drop(stream);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled = processed.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(processed.load(Ordering::SeqCst), settled);
    assert!(settled < 100_000);
}

// ---------------------------------------------------------------------------
// Logging and setup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_logs_reach_the_sink() {
    let recorder = Arc::new(Recorder::default());
    let stream = map_with(
        |x: String| vec![Ok::<_, String>(x.clone()), Ok(x)],
        vec!["a.xml".to_string(), "b.xml".to_string()],
        &config(1),
        recorder.clone(),
    )
    .unwrap();
    stream.collect_values().await.unwrap();

    let info = recorder.messages(Level::Info);
    assert_eq!(info[0], "Mapper 0: Starting up.");
    assert!(info.contains(&"Mapper 0: Processing a.xml".to_string()));
    assert!(info.contains(&"Mapper 0: Processing b.xml".to_string()));
    assert!(info.contains(&"Mapper 0: No more items to process".to_string()));
    let summary = info.last().unwrap();
    assert!(summary.contains("Mapper 0: - Extracted 2 values from a.xml in"));
    assert!(summary.contains("Mapper 0: - Extracted 2 values from b.xml in"));
    assert!(recorder.messages(Level::Error).is_empty());
}

#[tokio::test]
async fn long_items_are_truncated_in_logs() {
    let recorder = Arc::new(Recorder::default());
    let cfg = MapConfig {
        preview_len: 8,
        ..config(1)
    };
    let item = "x".repeat(500);
    map_with(
        |_: String| Vec::<Result<u32, String>>::new(),
        vec![item],
        &cfg,
        recorder.clone(),
    )
    .unwrap()
    .collect_values()
    .await
    .unwrap();

    let info = recorder.messages(Level::Info);
    assert!(info.contains(&"Mapper 0: Processing xxxxxxxx".to_string()));
    // The drain summary keeps the whole item.
    let summary = info.last().unwrap();
    assert!(summary.contains(&format!("values from {} in", "x".repeat(500))));
}

#[tokio::test]
async fn invalid_config_fails_before_starting() {
    let cfg = MapConfig {
        output_poll: Duration::ZERO,
        ..MapConfig::default()
    };
    let result = map_with(
        |x: u32| vec![Ok::<_, String>(x)],
        vec![1u32],
        &cfg,
        Arc::new(Recorder::default()),
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn map_outside_runtime_is_rejected() {
    let result = map(|x: u32| vec![Ok::<_, String>(x)], vec![1u32], Some(1));
    assert!(matches!(result, Err(Error::Runtime(_))));
}
