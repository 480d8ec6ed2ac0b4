//! Periodic progress reporting

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::counter::BarCounter;

/// Destination for user-facing status lines
pub trait ReportSink: Send + Sync {
    /// Periodic progress line
    fn bars_received(&self, count: u64);

    /// Startup confirmation once the subscription is live
    fn connection_established(&self, _symbols: &[String]) {}

    /// The stream ended without error
    fn stream_closed(&self) {}
}

/// Writes status lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReportSink;

impl ReportSink for StdoutReportSink {
    fn bars_received(&self, count: u64) {
        println!("Bars received: {}", count);
    }

    fn connection_established(&self, symbols: &[String]) {
        println!("Connection established: streaming bars for {}", symbols.join(", "));
    }

    fn stream_closed(&self) {
        println!("Bar stream closed without error");
    }
}

/// Background loop emitting the counter value every interval
pub struct PeriodicReporter {
    counter: Arc<BarCounter>,
    interval: Duration,
    sink: Arc<dyn ReportSink>,
}

impl PeriodicReporter {
    pub fn new(counter: Arc<BarCounter>, interval: Duration, sink: Arc<dyn ReportSink>) -> Self {
        Self { counter, interval, sink }
    }

    /// Report until `scope` is cancelled; returns the number of reports emitted
    pub async fn run(self, scope: CancellationToken) -> u64 {
        // First report one full interval after start, not immediately.
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Reporting bar count every {:?}", self.interval);

        let mut reports = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                _ = ticker.tick() => {
                    let count = self.counter.get();
                    debug!(count, "bar count report");
                    self.sink.bars_received(count);
                    reports += 1;
                }
            }
        }

        debug!("Reporter stopped after {} reports", reports);
        reports
    }
}
