//! # Bar Stream
//!
//! Live market bar ingestion with supervised shutdown.
//!
//! A [`LifecycleController`] owns one cancellation scope. It connects a [`BarStream`] with a
//! lock-free counting handler bound, then runs a [`PeriodicReporter`] and a
//! [`TerminationSupervisor`] next to the stream's delivery task until the scope is cancelled,
//! either by the operator (Ctrl+C / SIGTERM) or by the supervisor when the stream fails.

pub mod bar;
pub mod config;
pub mod counter;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod reporter;
pub mod signals;
pub mod stream;
pub mod supervisor;
pub mod ws;

#[cfg(test)]
mod integration_tests;

pub use bar::Bar;
pub use config::{Feed, LifecycleConfig, StreamConfig, StreamCredentials};
pub use counter::{BarCounter, BarHandler};
pub use error::{LifecycleError, StreamError};
pub use lifecycle::{exit_code, LifecycleController, ShutdownReason, ShutdownReport};
pub use mock::MockBarStream;
pub use reporter::{PeriodicReporter, ReportSink, StdoutReportSink};
pub use stream::{BarStream, Connected, StreamTermination, TerminationSignal};
pub use supervisor::{SupervisorOutcome, TerminationSupervisor};
pub use ws::WsBarStream;

/// Re-exported so callers can cancel the scope without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;

/// Default interval between progress reports (1 second)
pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 1000;

/// Default time shutdown waits for in-flight work
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;

/// Default market data stream host
pub const DEFAULT_STREAM_URL: &str = "wss://stream.data.alpaca.markets";
