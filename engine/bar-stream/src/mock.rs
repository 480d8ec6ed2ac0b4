//! Scripted in-process bar stream for tests and dry runs

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bar::Bar;
use crate::config::validate_symbols;
use crate::counter::BarHandler;
use crate::error::StreamError;
use crate::stream::{termination_channel, BarStream, Connected, StreamTermination};

/// One step of a mock delivery script
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Deliver `count` bars for `symbol` back to back
    Bars { symbol: String, count: u32 },
    /// Sleep before the next step
    Pause(Duration),
    /// End the stream with the given cause
    Terminate(StreamTermination),
}

/// Bar stream that replays a fixed script once connected
#[derive(Debug, Clone, Default)]
pub struct MockBarStream {
    symbols: Vec<String>,
    connect_error: Option<StreamError>,
    script: Vec<MockStep>,
    repeat: bool,
}

impl MockBarStream {
    pub fn builder() -> MockBarStreamBuilder {
        MockBarStreamBuilder::default()
    }

    /// Endless synthetic feed: one bar per symbol every `interval`
    pub fn synthetic(symbols: Vec<String>, interval: Duration) -> Self {
        let mut builder = Self::builder().pause(interval);
        for symbol in &symbols {
            builder = builder.deliver(symbol.clone(), 1);
        }
        builder.symbols(symbols).repeat().build()
    }
}

#[async_trait]
impl BarStream for MockBarStream {
    async fn connect(
        &mut self,
        handler: BarHandler,
        scope: CancellationToken,
    ) -> Result<Connected, StreamError> {
        if let Some(e) = &self.connect_error {
            return Err(e.clone());
        }
        validate_symbols(&self.symbols)?;

        let (notifier, signal) = termination_channel();
        let script = self.script.clone();
        let repeat = self.repeat;

        let delivery = tokio::spawn(async move {
            let termination = tokio::select! {
                _ = scope.cancelled() => StreamTermination::Clean,
                termination = play(script, repeat, handler) => match termination {
                    Some(termination) => termination,
                    None => {
                        // Script exhausted; stay connected until teardown.
                        scope.cancelled().await;
                        StreamTermination::Clean
                    }
                },
            };
            debug!("Mock stream finished: {:?}", termination);
            notifier.notify(termination);
        });

        Ok(Connected::new(self.symbols.clone(), signal).with_delivery_task(delivery))
    }
}

async fn play(script: Vec<MockStep>, repeat: bool, handler: BarHandler) -> Option<StreamTermination> {
    let mut price = 100.0;
    loop {
        for step in &script {
            match step {
                MockStep::Bars { symbol, count } => {
                    for _ in 0..*count {
                        price += 0.01;
                        handler(&Bar::flat(symbol.clone(), price, Utc::now()));
                    }
                }
                MockStep::Pause(duration) => tokio::time::sleep(*duration).await,
                MockStep::Terminate(termination) => return Some(termination.clone()),
            }
        }

        if !repeat || script.is_empty() {
            return None;
        }
    }
}

/// Builder for [`MockBarStream`] scripts
#[derive(Debug, Default)]
pub struct MockBarStreamBuilder {
    stream: MockBarStream,
}

impl MockBarStreamBuilder {
    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stream.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn fail_connect(mut self, error: StreamError) -> Self {
        self.stream.connect_error = Some(error);
        self
    }

    pub fn deliver(mut self, symbol: impl Into<String>, count: u32) -> Self {
        self.stream.script.push(MockStep::Bars { symbol: symbol.into(), count });
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.stream.script.push(MockStep::Pause(duration));
        self
    }

    /// `rounds` rounds of one bar per subscribed symbol, each round after `interval`
    pub fn deliver_every(mut self, rounds: u32, interval: Duration) -> Self {
        let symbols = self.stream.symbols.clone();
        for _ in 0..rounds {
            self = self.pause(interval);
            for symbol in &symbols {
                self = self.deliver(symbol.clone(), 1);
            }
        }
        self
    }

    pub fn terminate_clean(mut self) -> Self {
        self.stream.script.push(MockStep::Terminate(StreamTermination::Clean));
        self
    }

    pub fn terminate_with_error(mut self, error: StreamError) -> Self {
        self.stream.script.push(MockStep::Terminate(StreamTermination::Failed(error)));
        self
    }

    /// Loop the script until the scope is cancelled
    pub fn repeat(mut self) -> Self {
        self.stream.repeat = true;
        self
    }

    pub fn build(self) -> MockBarStream {
        self.stream
    }
}
