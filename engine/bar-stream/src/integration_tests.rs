//! End-to-end lifecycle tests driving the controller with scripted streams

use std::sync::Arc;
use std::time::Duration;

use crate::error::{LifecycleError, StreamError};
use crate::lifecycle::{exit_code, LifecycleController, ShutdownReason};
use crate::mock::MockBarStream;
use crate::reporter::test_support::RecordingSink;
use crate::LifecycleConfig;

fn one_second_reports() -> LifecycleConfig {
    LifecycleConfig { report_interval_ms: 1000, drain_timeout_ms: 1000 }
}

fn controller_with_sink() -> (Arc<LifecycleController>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let controller = Arc::new(LifecycleController::with_sink(one_second_reports(), sink.clone()));
    (controller, sink)
}

#[tokio::test(start_paused = true)]
async fn test_two_symbols_three_reports_then_operator_cancel() {
    let (controller, sink) = controller_with_sink();
    let stream = MockBarStream::builder()
        .symbols(["AAPL", "SPY"])
        .deliver_every(5, Duration::from_millis(450))
        .build();

    let runner = Arc::clone(&controller);
    let handle = tokio::spawn(async move { runner.run(stream).await });

    tokio::time::sleep(Duration::from_millis(3500)).await;
    controller.scope().cancel();
    let result = handle.await.unwrap();

    assert_eq!(exit_code(&result), 0);
    let report = result.unwrap();
    assert_eq!(report.reason, ShutdownReason::OperatorCancelled);
    assert_eq!(report.bars_received, 10);

    let reports = sink.reports();
    assert_eq!(reports.len(), 3, "unexpected reports: {:?}", reports);
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reports.last(), Some(&10));
    assert_eq!(sink.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clean_termination_keeps_running_until_cancelled() {
    let (controller, sink) = controller_with_sink();
    let stream = MockBarStream::builder()
        .symbols(["AAPL"])
        .deliver("AAPL", 4)
        .pause(Duration::from_millis(200))
        .terminate_clean()
        .build();

    let runner = Arc::clone(&controller);
    let handle = tokio::spawn(async move { runner.run(stream).await });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(sink.closed_count(), 1);
    assert!(!controller.scope().is_cancelled());
    assert!(!handle.is_finished());
    assert_eq!(sink.reports(), vec![4, 4]);

    controller.scope().cancel();
    let result = handle.await.unwrap();

    assert_eq!(exit_code(&result), 0);
    let report = result.unwrap();
    assert!(report.stream_closed_cleanly);
    assert_eq!(report.bars_received, 4);
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_cancels_scope_and_fails_run() {
    let (controller, sink) = controller_with_sink();
    let stream = MockBarStream::builder()
        .symbols(["SPY"])
        .deliver("SPY", 3)
        .pause(Duration::from_millis(500))
        .terminate_with_error(StreamError::Server {
            code: 406,
            message: "connection limit exceeded".to_string(),
        })
        .build();

    let runner = Arc::clone(&controller);
    let handle = tokio::spawn(async move { runner.run(stream).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    tokio::time::timeout(Duration::from_millis(1), controller.scope().cancelled())
        .await
        .expect("stream failure should cancel the scope without delay");

    let result = handle.await.unwrap();
    assert_ne!(exit_code(&result), 0);

    let err = result.unwrap_err();
    assert!(matches!(err, LifecycleError::StreamTerminated(StreamError::Server { code: 406, .. })));
    assert!(err.to_string().contains("connection limit exceeded"));
    assert_eq!(sink.closed_count(), 0);
    assert_eq!(controller.counter().get(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_exits_without_reporting() {
    let (controller, sink) = controller_with_sink();
    let stream = MockBarStream::builder()
        .symbols(["AAPL", "SPY"])
        .fail_connect(StreamError::Connection("network unreachable".to_string()))
        .deliver_every(5, Duration::from_millis(100))
        .build();

    let result = tokio::time::timeout(Duration::from_secs(10), controller.run(stream))
        .await
        .expect("connect failure must not hang");

    assert_eq!(exit_code(&result), 1);
    assert!(matches!(result, Err(LifecycleError::Connect(StreamError::Connection(_)))));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(sink.reports().is_empty());
    assert_eq!(controller.counter().get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_symbols_fail_startup() {
    let (controller, sink) = controller_with_sink();
    let stream = MockBarStream::builder().symbols(["not a symbol"]).build();

    let result = controller.run(stream).await;

    assert!(matches!(result, Err(LifecycleError::Connect(StreamError::InvalidSymbols(_)))));
    assert_eq!(sink.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_drains_before_final_count() {
    let (controller, _sink) = controller_with_sink();
    let stream = MockBarStream::synthetic(
        vec!["AAPL".to_string(), "SPY".to_string()],
        Duration::from_millis(100),
    );

    let runner = Arc::clone(&controller);
    let handle = tokio::spawn(async move { runner.run(stream).await });

    tokio::time::sleep(Duration::from_millis(1050)).await;
    controller.scope().cancel();
    let report = handle.await.unwrap().unwrap();

    // Ten rounds of two symbols, and nothing counted after shutdown.
    assert_eq!(report.bars_received, 20);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.counter().get(), 20);
}
