//! Lock-free bar counter and the handler bound to the stream

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bar::Bar;

/// Callback invoked by a stream once per delivered bar
///
/// Streams may call it from any thread and concurrently with itself.
pub type BarHandler = Arc<dyn Fn(&Bar) + Send + Sync>;

/// Count of bars received since startup
#[derive(Debug, Default)]
pub struct BarCounter {
    received: AtomicU64,
}

impl BarCounter {
    pub fn new() -> Self {
        Self { received: AtomicU64::new(0) }
    }

    /// Record one bar and return the new total
    #[inline]
    pub fn increment(&self) -> u64 {
        self.received.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current total; advisory only while deliveries are in flight
    #[inline]
    pub fn get(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Build the stream handler that feeds this counter
    ///
    /// The handler never blocks, allocates or fails; the bar payload is ignored.
    pub fn handler(self: &Arc<Self>) -> BarHandler {
        let counter = Arc::clone(self);
        Arc::new(move |_bar: &Bar| {
            counter.increment();
        })
    }
}
