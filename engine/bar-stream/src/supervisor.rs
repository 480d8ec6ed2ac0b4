//! Watches the stream's termination signal and escalates failures

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::StreamError;
use crate::reporter::ReportSink;
use crate::stream::{StreamTermination, TerminationSignal};

/// How the supervisor resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// The stream ended cleanly; the scope was left running
    Clean,
    /// The stream failed; the scope was cancelled
    Failed(StreamError),
    /// The scope was cancelled before the stream reported anything
    Cancelled,
}

/// Single-shot watcher over a [`TerminationSignal`]
pub struct TerminationSupervisor {
    signal: TerminationSignal,
    sink: Arc<dyn ReportSink>,
}

impl TerminationSupervisor {
    pub fn new(signal: TerminationSignal, sink: Arc<dyn ReportSink>) -> Self {
        Self { signal, sink }
    }

    /// Wait for the stream to end or the scope to be cancelled
    ///
    /// A failed stream cancels `scope` before this returns, which is what brings the rest of
    /// the process down. A clean end only resolves this task.
    pub async fn run(self, scope: CancellationToken) -> SupervisorOutcome {
        // Cancellation wins ties: a stream closing because of our own teardown is not news.
        let termination = tokio::select! {
            biased;
            _ = scope.cancelled() => return SupervisorOutcome::Cancelled,
            termination = self.signal.wait() => termination,
        };

        match termination {
            StreamTermination::Clean => {
                info!("Bar stream ended without error");
                self.sink.stream_closed();
                SupervisorOutcome::Clean
            }
            StreamTermination::Failed(e) => {
                error!("Bar stream terminated with error: {}", e);
                scope.cancel();
                SupervisorOutcome::Failed(e)
            }
        }
    }
}
