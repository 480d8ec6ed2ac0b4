//! Streaming connection contract
//!
//! A [`BarStream`] opens a subscription, invokes the bound [`BarHandler`] once per bar, and
//! reports how the stream ended through a single-use [`TerminationSignal`].

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::counter::BarHandler;
use crate::error::StreamError;

/// How an established stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTermination {
    /// End of stream without error (server close or local teardown)
    Clean,
    /// The stream failed after it was established
    Failed(StreamError),
}

impl StreamTermination {
    pub fn is_clean(&self) -> bool {
        matches!(self, StreamTermination::Clean)
    }
}

/// Receiving half of the termination channel
///
/// Resolves exactly once. Awaiting consumes it, so a second read does not compile.
#[derive(Debug)]
pub struct TerminationSignal {
    rx: oneshot::Receiver<StreamTermination>,
}

/// Sending half of the termination channel, owned by the stream implementation
#[derive(Debug)]
pub struct TerminationNotifier {
    tx: oneshot::Sender<StreamTermination>,
}

/// Create a linked notifier/signal pair
pub fn termination_channel() -> (TerminationNotifier, TerminationSignal) {
    let (tx, rx) = oneshot::channel();
    (TerminationNotifier { tx }, TerminationSignal { rx })
}

impl TerminationNotifier {
    /// Publish the termination cause; a no-op if nobody is listening anymore
    pub fn notify(self, termination: StreamTermination) {
        let _ = self.tx.send(termination);
    }
}

impl TerminationSignal {
    /// Wait for the termination cause
    ///
    /// A notifier dropped without notifying resolves as [`StreamError::SignalDropped`].
    pub async fn wait(self) -> StreamTermination {
        match self.rx.await {
            Ok(termination) => termination,
            Err(_) => StreamTermination::Failed(StreamError::SignalDropped),
        }
    }
}

/// An established stream subscription
#[derive(Debug)]
pub struct Connected {
    symbols: Vec<String>,
    termination: TerminationSignal,
    delivery_tasks: Vec<JoinHandle<()>>,
}

impl Connected {
    pub fn new(symbols: Vec<String>, termination: TerminationSignal) -> Self {
        Self { symbols, termination, delivery_tasks: Vec::new() }
    }

    /// Register a task that invokes the handler, so shutdown can drain it
    pub fn with_delivery_task(mut self, task: JoinHandle<()>) -> Self {
        self.delivery_tasks.push(task);
        self
    }

    /// Symbols the subscription was acknowledged for
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Split into the termination signal and the delivery task handles
    pub fn into_parts(self) -> (TerminationSignal, Vec<JoinHandle<()>>) {
        (self.termination, self.delivery_tasks)
    }

    /// Take the termination signal, dropping the delivery handles (tasks keep running)
    pub fn terminated(self) -> TerminationSignal {
        self.termination
    }
}

/// A push-based source of market bars
#[async_trait]
pub trait BarStream: Send {
    /// Authenticate, subscribe and start delivering bars to `handler`
    ///
    /// Delivery must stop, and the termination signal resolve, once `scope` is cancelled.
    /// Failures are returned as-is; retrying is up to the implementation.
    async fn connect(
        &mut self,
        handler: BarHandler,
        scope: CancellationToken,
    ) -> Result<Connected, StreamError>;
}
