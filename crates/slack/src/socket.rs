use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use reqwest::Url;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{watch, Mutex},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::api::HttpSlackApi;
use crate::events::{EventContext, EventHandler, HandlerResult, SlackEnvelope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// One Socket Mode session at a time. `next_envelope` yields `Ok(None)` when
/// the server ends the session; the runner then calls `connect` again.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

enum PumpExit {
    Shutdown,
    Closed,
    Failed(TransportError),
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    handler: Arc<dyn EventHandler>,
    reconnect_policy: ReconnectPolicy,
    shutdown: watch::Sender<bool>,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        handler: Arc<dyn EventHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { transport, handler, reconnect_policy, shutdown }
    }

    /// Opens the first session. Failure here is reported to the caller
    /// instead of being retried.
    pub async fn open(&self) -> Result<(), TransportError> {
        info!(event_name = "ingress.slack.socket_opening", "opening socket mode connection");
        self.transport.connect().await?;
        info!(event_name = "ingress.slack.socket_opened", "socket mode connected");
        Ok(())
    }

    /// Pumps envelopes until [`stop`](Self::stop) is called or reconnection
    /// gives up. Never returns an error: losing the socket is logged, not
    /// propagated.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            match self.pump(&mut shutdown).await {
                PumpExit::Shutdown => {
                    info!(event_name = "ingress.slack.socket_stopped", "socket mode loop stopped");
                    return;
                }
                PumpExit::Closed => {
                    info!(
                        event_name = "ingress.slack.socket_closed",
                        "socket mode session closed by server; reconnecting"
                    );
                }
                PumpExit::Failed(error) => {
                    warn!(
                        event_name = "ingress.slack.socket_failed",
                        error = %error,
                        "socket mode session failed; reconnecting"
                    );
                }
            }

            if !self.reconnect(&mut shutdown).await {
                return;
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    async fn pump(&self, shutdown: &mut watch::Receiver<bool>) -> PumpExit {
        loop {
            let next = tokio::select! {
                _ = shutdown.wait_for(|stopped| *stopped) => return PumpExit::Shutdown,
                next = self.transport.next_envelope() => next,
            };

            match next {
                Ok(Some(envelope)) => self.process(&envelope).await,
                Ok(None) => return PumpExit::Closed,
                Err(error) => return PumpExit::Failed(error),
            }
        }
    }

    async fn process(&self, envelope: &SlackEnvelope) {
        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            "received slack envelope"
        );

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "acknowledged slack envelope"
            );
        }

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        match self.handler.handle(envelope, &context).await {
            HandlerResult::Delivered => debug!(
                event_name = "ingress.slack.message_delivered",
                correlation_id = %context.correlation_id,
                "inbound message handed to bus"
            ),
            HandlerResult::MetadataOnly => debug!(
                event_name = "ingress.slack.metadata_only",
                correlation_id = %context.correlation_id,
                "chat not registered; reported metadata only"
            ),
            HandlerResult::Ignored(reason) => debug!(
                event_name = "ingress.slack.event_ignored",
                correlation_id = %context.correlation_id,
                reason = ?reason,
                "slack event ignored"
            ),
        }
    }

    /// Returns `false` once shutdown was requested or retries are exhausted.
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        for attempt in 0..=self.reconnect_policy.max_retries {
            if attempt > 0 {
                let delay = self.reconnect_policy.backoff(attempt - 1);
                tokio::select! {
                    _ = shutdown.wait_for(|stopped| *stopped) => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            } else if *shutdown.borrow() {
                return false;
            }

            match self.transport.connect().await {
                Ok(()) => {
                    info!(
                        event_name = "ingress.slack.socket_reconnected",
                        attempt,
                        "socket mode reconnected"
                    );
                    return true;
                }
                Err(error) => warn!(
                    event_name = "ingress.slack.socket_reconnect_failed",
                    attempt,
                    max_retries = self.reconnect_policy.max_retries,
                    error = %error,
                    "socket mode reconnect failed"
                ),
            }
        }

        error!(
            event_name = "ingress.slack.socket_retries_exhausted",
            max_retries = self.reconnect_policy.max_retries,
            "socket mode retries exhausted; inbound events will not be received"
        );
        false
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a real WebSocket. Every `connect` asks
/// `apps.connections.open` for a fresh URL.
pub struct WebSocketTransport {
    api: Arc<HttpSlackApi>,
    app_token: SecretString,
    url_policy: SocketUrlPolicy,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
}

impl WebSocketTransport {
    pub fn new(api: Arc<HttpSlackApi>, app_token: SecretString) -> Self {
        let url_policy = SocketUrlPolicy::for_api_base(api.base_url());
        Self { api, app_token, url_policy, writer: Mutex::new(None), reader: Mutex::new(None) }
    }

    async fn send_frame(&self, message: Message) -> Result<(), String> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err("socket is not connected".to_owned());
        };
        sink.send(message).await.map_err(|error| error.to_string())
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .api
            .open_socket_connection(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let url = self.url_policy.check(&url)?;

        let (stream, _) =
            connect_async(url.as_str()).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, source) = stream.split();

        if let Some(mut previous) = self.writer.lock().await.replace(sink) {
            let _ = previous.close().await;
        }
        *self.reader.lock().await = Some(source);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut reader = self.reader.lock().await;
        let Some(source) = reader.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => match classify_frame(&text) {
                    SocketFrame::Envelope(envelope) => return Ok(Some(envelope)),
                    SocketFrame::Hello => {
                        debug!(event_name = "ingress.slack.socket_hello", "socket mode hello received");
                    }
                    SocketFrame::Disconnect { reason } => {
                        info!(
                            event_name = "ingress.slack.socket_disconnect_requested",
                            reason = %reason,
                            "slack requested socket refresh"
                        );
                        reader.take();
                        return Ok(None);
                    }
                    SocketFrame::Ignored(reason) => {
                        warn!(
                            event_name = "ingress.slack.frame_ignored",
                            reason = %reason,
                            "ignoring socket mode frame"
                        );
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(error) = self.send_frame(Message::Pong(payload)).await {
                        debug!(error = %error, "failed to answer socket ping");
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    reader.take();
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    reader.take();
                    return Err(TransportError::Receive(error.to_string()));
                }
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let ack = serde_json::json!({ "envelope_id": envelope_id }).to_string();
        self.send_frame(Message::Text(ack.into())).await.map_err(TransportError::Acknowledge)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.reader.lock().await.take();
        let Some(mut sink) = self.writer.lock().await.take() else {
            return Ok(());
        };
        sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Ignored(String),
}

pub fn classify_frame(text: &str) -> SocketFrame {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => return SocketFrame::Ignored(format!("unparseable frame: {error}")),
    };

    match frame.get("type").and_then(Value::as_str) {
        Some("hello") => SocketFrame::Hello,
        Some("disconnect") => SocketFrame::Disconnect {
            reason: frame.get("reason").and_then(Value::as_str).unwrap_or("unknown").to_owned(),
        },
        _ => match SlackEnvelope::from_frame(&frame) {
            Ok(envelope) => SocketFrame::Envelope(envelope),
            Err(error) => SocketFrame::Ignored(error.to_string()),
        },
    }
}

/// Which socket URLs get dialed. `wss://` is accepted on `slack.com`, its
/// subdomains and the configured API host. Plain `ws://` is accepted only
/// to the API host, and only when the API itself is served over `http://`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketUrlPolicy {
    api_host: Option<String>,
    api_is_plain: bool,
}

impl SocketUrlPolicy {
    pub fn for_api_base(api_base_url: &str) -> Self {
        match Url::parse(api_base_url) {
            Ok(base) => Self {
                api_host: base.host_str().map(str::to_ascii_lowercase),
                api_is_plain: base.scheme() == "http",
            },
            Err(_) => Self { api_host: None, api_is_plain: false },
        }
    }

    pub fn check(&self, url: &str) -> Result<Url, TransportError> {
        let parsed = Url::parse(url)
            .map_err(|error| TransportError::Connect(format!("socket url is not a valid url: {error}")))?;
        let host = parsed.host_str().unwrap_or_default();
        let is_api_host = self.api_host.as_deref() == Some(host);

        match parsed.scheme() {
            "wss" if host == "slack.com" || host.ends_with(".slack.com") || is_api_host => Ok(parsed),
            "wss" => Err(TransportError::Connect(format!(
                "socket url host must be *.slack.com or the api host, got {host}"
            ))),
            "ws" if self.api_is_plain && is_api_host => Ok(parsed),
            "ws" => Err(TransportError::Connect(format!(
                "plain ws:// is only dialed to an http:// api host, got {host}"
            ))),
            other => Err(TransportError::Connect(format!("socket url must use wss://, got {other}"))),
        }
    }
}
