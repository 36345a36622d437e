//! Event stream transport.
//!
//! The pipeline consumes any `Stream<Item = StreamEvent>`. [`WebSocketTransport`]
//! produces one from the platform's WebSocket gateway: it connects, keeps
//! the socket alive with pings, reconnects with backoff when it drops and
//! resumes from the last seen message id.
//!
//! Events are delivered through a bounded `mpsc` channel, so a slow
//! consumer holds back the socket reader instead of buffering without limit.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, trace, warn};

use crate::config::ReconnectConfig;
use crate::telemetry;
use crate::{HuginnError, Result};

/// Default WebSocket gateway URL.
pub const DEFAULT_WS_URL: &str = "wss://www.guilded.gg/websocket/v1";

/// Header carrying the resume point on reconnect.
pub const LAST_MESSAGE_ID_HEADER: &str = "guilded-last-message-id";

/// Number of stream events buffered ahead of the consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 256;

/// Ping interval used until the welcome frame says otherwise.
const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(22_500);

/// Connection-level events from a stream transport.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Handshake completed. Carries the welcome payload (including `user`).
    Connected(Value),
    /// The connection dropped. A reconnect may follow.
    Disconnected { reason: String },
    /// A pushed event.
    Data { kind: String, payload: Value },
}

/// Gateway frame.
#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    s: Option<String>,
    #[serde(default)]
    t: Option<String>,
}

const OP_EVENT: u8 = 0;
const OP_WELCOME: u8 = 1;
const OP_RESUME: u8 = 2;
const OP_ERROR: u8 = 8;

enum SessionEnd {
    Closed(String),
    ReceiverGone,
}

/// WebSocket client for the event gateway.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    token: String,
    user_agent: String,
    reconnect: ReconnectConfig,
    buffer: usize,
}

impl WebSocketTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            token: token.into(),
            user_agent: crate::version::user_agent(),
            reconnect: ReconnectConfig::default(),
            buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start the connection loop and return its event stream.
    ///
    /// The loop stops when the stream is dropped or the reconnect limit is
    /// reached; the stream then ends.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn spawn(self) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(async move { self.run(tx).await });
        ReceiverStream::new(rx)
    }

    async fn run(self, tx: mpsc::Sender<StreamEvent>) {
        let mut resume: Option<String> = None;
        let mut failures: u32 = 0;

        loop {
            let mut connected = false;
            let reason = match self.session(&tx, &mut resume, &mut connected).await {
                Ok(SessionEnd::ReceiverGone) => return,
                Ok(SessionEnd::Closed(reason)) => reason,
                Err(e) => e.to_string(),
            };

            if connected {
                failures = 0;
                info!(%reason, "gateway connection closed");
                let event = StreamEvent::Disconnected {
                    reason: reason.clone(),
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            } else {
                failures += 1;
                warn!(%reason, attempt = failures, "gateway connection failed");
            }

            if let Some(max) = self.reconnect.max_attempts
                && failures >= max
            {
                warn!(attempts = failures, "giving up on gateway reconnect");
                return;
            }

            let delay = self.reconnect.backoff.delay_for_attempt(failures);
            metrics::counter!(telemetry::RECONNECTS_TOTAL).increment(1);
            debug!(delay_ms = delay.as_millis() as u64, "reconnecting to gateway");
            tokio::time::sleep(delay).await;
        }
    }

    /// Run one connection until it closes.
    async fn session(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        resume: &mut Option<String>,
        connected: &mut bool,
    ) -> Result<SessionEnd> {
        let mut request = self.url.as_str().into_client_request().map_err(stream_error)?;
        let headers = request.headers_mut();
        headers.insert("authorization", header(&format!("Bearer {}", self.token))?);
        headers.insert("user-agent", header(&self.user_agent)?);
        if let Some(last) = resume.as_deref() {
            headers.insert(LAST_MESSAGE_ID_HEADER, header(last)?);
        }

        let (socket, _) = connect_async(request).await.map_err(stream_error)?;
        let (mut sink, mut stream) = socket.split();
        let mut heartbeat = heartbeat_interval(DEFAULT_HEARTBEAT);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let envelope: Envelope = match serde_json::from_str(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                warn!(error = %e, "ignoring malformed gateway frame");
                                continue;
                            }
                        };
                        match envelope.op {
                            OP_EVENT => {
                                if let Some(id) = envelope.s {
                                    *resume = Some(id);
                                }
                                let (Some(kind), Some(payload)) = (envelope.t, envelope.d) else {
                                    continue;
                                };
                                trace!(%kind, "gateway event");
                                if tx.send(StreamEvent::Data { kind, payload }).await.is_err() {
                                    return Ok(SessionEnd::ReceiverGone);
                                }
                            }
                            OP_WELCOME => {
                                let welcome = envelope.d.unwrap_or(Value::Null);
                                if let Some(ms) = welcome.get("heartbeatIntervalMs").and_then(Value::as_u64) {
                                    heartbeat = heartbeat_interval(Duration::from_millis(ms.max(1)));
                                }
                                if let Some(id) = welcome.get("lastMessageId").and_then(Value::as_str) {
                                    *resume = Some(id.to_string());
                                }
                                *connected = true;
                                info!("gateway connected");
                                if tx.send(StreamEvent::Connected(welcome)).await.is_err() {
                                    return Ok(SessionEnd::ReceiverGone);
                                }
                            }
                            OP_RESUME => {
                                if let Some(id) = envelope
                                    .d
                                    .as_ref()
                                    .and_then(|d| d.get("lastMessageId"))
                                    .and_then(Value::as_str)
                                {
                                    *resume = Some(id.to_string());
                                }
                                debug!("gateway session resumed");
                            }
                            OP_ERROR => {
                                *resume = None;
                                let message = envelope
                                    .d
                                    .as_ref()
                                    .and_then(|d| d.get("message"))
                                    .and_then(Value::as_str)
                                    .unwrap_or("unknown error");
                                warn!(%message, "gateway error, resume state cleared");
                            }
                            op => trace!(op, "ignoring gateway opcode"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        sink.send(Message::Pong(data)).await.map_err(stream_error)?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return Ok(SessionEnd::Closed(reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(stream_error(e)),
                    None => return Ok(SessionEnd::Closed("stream ended".to_string())),
                },
                _ = heartbeat.tick() => {
                    sink.send(Message::Ping(Vec::new())).await.map_err(stream_error)?;
                }
                _ = tx.closed() => return Ok(SessionEnd::ReceiverGone),
            }
        }
    }
}

fn heartbeat_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn header(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| HuginnError::Configuration(format!("invalid header value: {e}")))
}

fn stream_error(e: impl std::fmt::Display) -> HuginnError {
    HuginnError::Stream(e.to_string())
}
