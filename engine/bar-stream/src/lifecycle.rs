//! Lifecycle controller: owns the cancellation scope and wires every task to it

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::LifecycleConfig;
use crate::counter::BarCounter;
use crate::error::LifecycleError;
use crate::reporter::{PeriodicReporter, ReportSink, StdoutReportSink};
use crate::signals;
use crate::stream::BarStream;
use crate::supervisor::{SupervisorOutcome, TerminationSupervisor};

/// Why a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The scope was cancelled by the operator (or the embedding caller)
    OperatorCancelled,
}

/// Summary returned by a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,

    /// Counter value after delivery was drained
    pub bars_received: u64,

    /// Whether the stream reported a clean end before shutdown
    pub stream_closed_cleanly: bool,
}

/// Runs one bar stream from connect to teardown
pub struct LifecycleController {
    config: LifecycleConfig,
    scope: CancellationToken,
    counter: Arc<BarCounter>,
    sink: Arc<dyn ReportSink>,
}

impl LifecycleController {
    /// Create a controller reporting to stdout
    pub fn new(config: LifecycleConfig) -> Self {
        Self::with_sink(config, Arc::new(StdoutReportSink))
    }

    /// Create a controller reporting to a custom sink
    pub fn with_sink(config: LifecycleConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            config,
            scope: CancellationToken::new(),
            counter: Arc::new(BarCounter::new()),
            sink,
        }
    }

    /// Handle to the shared scope; cancelling it shuts the run down
    pub fn scope(&self) -> CancellationToken {
        self.scope.clone()
    }

    /// Shared bar counter
    pub fn counter(&self) -> Arc<BarCounter> {
        Arc::clone(&self.counter)
    }

    /// Cancel the scope on Ctrl+C or SIGTERM
    pub fn listen_for_interrupt(&self) -> JoinHandle<()> {
        signals::cancel_on_shutdown_signal(self.scope.clone())
    }

    /// Connect `stream`, run until the scope is cancelled, then tear everything down
    ///
    /// Connection failures return immediately without starting the reporter or supervisor.
    /// A stream failure cancels the scope and is returned as
    /// [`LifecycleError::StreamTerminated`]. The scope is always cancelled on return, which
    /// closes the stream's transport.
    pub async fn run<S: BarStream>(&self, mut stream: S) -> Result<ShutdownReport, LifecycleError> {
        let _teardown = self.scope.clone().drop_guard();

        // 1. Connect with the counter's handler bound
        let connected = stream
            .connect(self.counter.handler(), self.scope.clone())
            .await
            .map_err(|e| {
                error!("Failed to establish bar stream: {}", e);
                LifecycleError::Connect(e)
            })?;

        info!("Connection established for {:?}", connected.symbols());
        self.sink.connection_established(connected.symbols());

        // 2. Start reporter and supervisor as independent tasks
        let (signal, delivery_tasks) = connected.into_parts();

        let reporter = PeriodicReporter::new(
            self.counter(),
            self.config.report_interval(),
            Arc::clone(&self.sink),
        );
        let reporter_handle = tokio::spawn(reporter.run(self.scope.clone()));

        let supervisor = TerminationSupervisor::new(signal, Arc::clone(&self.sink));
        let supervisor_handle = tokio::spawn(supervisor.run(self.scope.clone()));

        // 3. Block until cancelled by the operator or by escalation
        self.scope.cancelled().await;
        info!("Shutdown requested, draining bar stream");

        // 4. Drain delivery first so the final count is settled
        let drain_timeout = self.config.drain_timeout();
        for task in delivery_tasks {
            join_with_timeout("bar delivery", task, drain_timeout).await;
        }
        join_with_timeout("reporter", reporter_handle, drain_timeout).await;
        let outcome = join_with_timeout("termination supervisor", supervisor_handle, drain_timeout)
            .await
            .unwrap_or(SupervisorOutcome::Cancelled);

        let bars_received = self.counter.get();
        info!("Bar stream shut down after {} bars", bars_received);

        match outcome {
            SupervisorOutcome::Failed(e) => Err(LifecycleError::StreamTerminated(e)),
            SupervisorOutcome::Clean => Ok(ShutdownReport {
                reason: ShutdownReason::OperatorCancelled,
                bars_received,
                stream_closed_cleanly: true,
            }),
            SupervisorOutcome::Cancelled => Ok(ShutdownReport {
                reason: ShutdownReason::OperatorCancelled,
                bars_received,
                stream_closed_cleanly: false,
            }),
        }
    }
}

/// Process exit status for the result of [`LifecycleController::run`]
pub fn exit_code(result: &Result<ShutdownReport, LifecycleError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}

async fn join_with_timeout<T>(name: &str, handle: JoinHandle<T>, limit: Duration) -> Option<T> {
    match timeout(limit, handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("{} task failed: {}", name, e);
            None
        }
        Err(_) => {
            warn!("{} did not stop within {:?}, abandoning it", name, limit);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::mock::MockBarStream;
    use crate::reporter::test_support::RecordingSink;

    fn test_config() -> LifecycleConfig {
        LifecycleConfig { report_interval_ms: 1000, drain_timeout_ms: 500 }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_starts_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let controller = LifecycleController::with_sink(test_config(), sink.clone());
        let stream = MockBarStream::builder()
            .fail_connect(StreamError::Authentication("forbidden".to_string()))
            .build();

        let result = tokio::time::timeout(Duration::from_secs(5), controller.run(stream))
            .await
            .expect("a failed connect must not hang");

        let err = result.unwrap_err();
        assert!(matches!(err, LifecycleError::Connect(StreamError::Authentication(_))));
        assert_ne!(err.exit_code(), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(sink.reports().is_empty());
        assert_eq!(sink.connection_count(), 0);
        assert_eq!(controller.counter().get(), 0);
        assert!(controller.scope().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scope_closes_stream() {
        let sink = Arc::new(RecordingSink::default());
        let controller = LifecycleController::with_sink(test_config(), sink.clone());
        let stream = MockBarStream::builder().symbols(["AAPL"]).build();
        let scope = controller.scope();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            scope.cancel();
        });

        let report = controller.run(stream).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(report.reason, ShutdownReason::OperatorCancelled);
        assert_eq!(report.bars_received, 0);
        assert_eq!(sink.connection_count(), 1);
        assert_eq!(sink.reports(), vec![0]);
    }
}
