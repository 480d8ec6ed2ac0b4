//! WebSocket market data stream
//!
//! Speaks the JSON variant of the v2 market data protocol:
//!
//! 1. server greets with `[{"T":"success","msg":"connected"}]`
//! 2. client sends `{"action":"auth","key":..,"secret":..}`, server answers `authenticated`
//! 3. client sends `{"action":"subscribe","bars":[..]}`, server acknowledges with `subscription`
//! 4. server pushes arrays of messages; `"T":"b"` entries are bars

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bar::Bar;
use crate::config::StreamConfig;
use crate::counter::BarHandler;
use crate::error::StreamError;
use crate::stream::{
    termination_channel, BarStream, Connected, StreamTermination, TerminationNotifier,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages the client sends
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientMessage<'a> {
    Auth { key: &'a str, secret: &'a str },
    Subscribe { bars: &'a [String] },
}

/// Messages the server pushes, one per array element
#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
enum ServerMessage {
    #[serde(rename = "success")]
    Success { msg: String },

    #[serde(rename = "error")]
    Error { code: i64, msg: String },

    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },

    #[serde(rename = "b")]
    Bar(Bar),

    #[serde(other)]
    Other,
}

/// Handshake stage, used to classify server errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Greeting,
    Auth,
    Subscribe,
}

/// Bar stream backed by a websocket connection to the market data feed
pub struct WsBarStream {
    config: StreamConfig,
}

impl WsBarStream {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    async fn handshake(&self, reader: &mut WsReader, writer: &mut WsWriter) -> Result<Vec<String>, StreamError> {
        expect_success(reader, Stage::Greeting, "connected").await?;
        debug!("Stream greeting received");

        let credentials = &self.config.credentials;
        send_json(
            writer,
            &ClientMessage::Auth { key: &credentials.key_id, secret: &credentials.secret },
        )
        .await?;
        expect_success(reader, Stage::Auth, "authenticated").await?;
        debug!("Stream authenticated as {}", credentials.key_id);

        send_json(writer, &ClientMessage::Subscribe { bars: &self.config.symbols }).await?;
        let subscribed = expect_subscription(reader).await?;

        Ok(subscribed)
    }
}

#[async_trait]
impl BarStream for WsBarStream {
    async fn connect(
        &mut self,
        handler: BarHandler,
        scope: CancellationToken,
    ) -> Result<Connected, StreamError> {
        self.config.validate()?;

        let endpoint = self.config.endpoint();
        info!("Connecting to {} for {:?}", endpoint, self.config.symbols);

        let (ws, _response) = tokio::select! {
            _ = scope.cancelled() => {
                return Err(StreamError::Connection("cancelled before connecting".to_string()))
            }
            result = connect_async(endpoint.as_str()) => result?,
        };
        let (mut writer, mut reader) = ws.split();

        let subscribed = match timeout(HANDSHAKE_TIMEOUT, self.handshake(&mut reader, &mut writer)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StreamError::Connection(format!(
                    "handshake did not complete within {:?}",
                    HANDSHAKE_TIMEOUT
                )))
            }
        };
        info!("Subscribed to bars for {:?}", subscribed);

        let (notifier, signal) = termination_channel();
        let delivery = tokio::spawn(deliver(reader, writer, handler, scope, notifier));

        Ok(Connected::new(subscribed, signal).with_delivery_task(delivery))
    }
}

/// Pump frames into `handler` until the server, the transport or the scope ends the stream
async fn deliver(
    mut reader: WsReader,
    mut writer: WsWriter,
    handler: BarHandler,
    scope: CancellationToken,
    notifier: TerminationNotifier,
) {
    let termination = loop {
        tokio::select! {
            _ = scope.cancelled() => {
                if let Err(e) = writer.send(Message::Close(None)).await {
                    debug!("Failed to send close frame: {}", e);
                }
                break StreamTermination::Clean;
            }
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = dispatch(&text, &handler) {
                        break StreamTermination::Failed(e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the stream: {:?}", frame);
                    break StreamTermination::Clean;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break StreamTermination::Failed(e.into()),
                None => {
                    break StreamTermination::Failed(StreamError::Transport(
                        "connection dropped without a close frame".to_string(),
                    ))
                }
            },
        }
    };

    notifier.notify(termination);
}

/// Route one text frame; returns the number of bars handed to `handler`
///
/// Malformed entries are skipped. Only a server `error` message fails the stream.
fn dispatch(text: &str, handler: &BarHandler) -> Result<usize, StreamError> {
    let mut delivered = 0;
    for message in parse_frame(text) {
        match message {
            ServerMessage::Bar(bar) => {
                handler(&bar);
                delivered += 1;
            }
            ServerMessage::Error { code, msg } => {
                return Err(StreamError::Server { code, message: msg });
            }
            other => debug!("Ignoring stream message: {:?}", other),
        }
    }
    Ok(delivered)
}

fn parse_frame(text: &str) -> Vec<ServerMessage> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Skipping unparseable frame: {}", e);
            return Vec::new();
        }
    };

    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        single => vec![single],
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ServerMessage>(entry) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping malformed stream message: {}", e);
                None
            }
        })
        .collect()
}

async fn send_json(writer: &mut WsWriter, message: &ClientMessage<'_>) -> Result<(), StreamError> {
    let payload = serde_json::to_string(message)?;
    writer.send(Message::Text(payload)).await?;
    Ok(())
}

/// Read the next batch of decoded messages during the handshake
async fn next_messages(reader: &mut WsReader) -> Result<Vec<ServerMessage>, StreamError> {
    loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => return Ok(parse_frame(&text)),
            Some(Ok(Message::Close(frame))) => {
                return Err(StreamError::Connection(format!(
                    "server closed the connection during handshake: {:?}",
                    frame
                )))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(StreamError::Connection(
                    "connection ended during handshake".to_string(),
                ))
            }
        }
    }
}

async fn expect_success(reader: &mut WsReader, stage: Stage, expected: &str) -> Result<(), StreamError> {
    loop {
        for message in next_messages(reader).await? {
            match message {
                ServerMessage::Success { msg } if msg == expected => return Ok(()),
                ServerMessage::Error { code, msg } => return Err(handshake_error(stage, code, msg)),
                other => debug!("Ignoring {:?} while waiting for '{}'", other, expected),
            }
        }
    }
}

async fn expect_subscription(reader: &mut WsReader) -> Result<Vec<String>, StreamError> {
    loop {
        for message in next_messages(reader).await? {
            match message {
                ServerMessage::Subscription { bars } => return Ok(bars),
                ServerMessage::Error { code, msg } => {
                    return Err(handshake_error(Stage::Subscribe, code, msg))
                }
                other => debug!("Ignoring {:?} while waiting for subscription", other),
            }
        }
    }
}

fn handshake_error(stage: Stage, code: i64, msg: String) -> StreamError {
    match stage {
        Stage::Auth => StreamError::Authentication(format!("{} ({})", msg, code)),
        Stage::Subscribe => StreamError::InvalidSymbols(format!("{} ({})", msg, code)),
        Stage::Greeting => StreamError::Server { code, message: msg },
    }
}
