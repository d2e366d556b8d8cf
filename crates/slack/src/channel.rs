//! The Slack implementation of [`Channel`].
//!
//! Inbound: a [`SocketModeRunner`] pumps envelopes into an [`InboundHandler`]
//! that screens, normalizes and forwards them to the [`MessageBus`].
//! Outbound: replies degrade from Block Kit to a markdown block to plain text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use slackbridge_core::{
    config::AppConfig, BestEffort, Channel, ChannelError, DeliveryFormat, DeliveryReceipt,
    InboundMessage, MessageBus,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, HttpSlackApi, PostMessageRequest, PostedMessage, SlackApi};
use crate::blocks::{block_kit_message, markdown_message, parse_blocks, plain_message};
use crate::events::{
    channel_id_from_jid, screen_message, DiscardReason, EventContext, EventHandler,
    HandlerResult, SlackEnvelope, SlackEvent, JID_PREFIX,
};
use crate::socket::{ReconnectPolicy, SocketModeRunner, SocketTransport, WebSocketTransport};

pub const CHANNEL_NAME: &str = "slack";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackChannelOptions {
    pub ack_text: String,
    pub block_fallback_text: String,
    pub reconnect_policy: ReconnectPolicy,
}

impl Default for SlackChannelOptions {
    fn default() -> Self {
        Self {
            ack_text: ":thinking_face:".to_owned(),
            block_fallback_text: "Message from Andy".to_owned(),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl SlackChannelOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ack_text: config.slack.ack_text.clone(),
            block_fallback_text: config.slack.block_fallback_text(),
            reconnect_policy: ReconnectPolicy {
                max_retries: config.socket.max_retries,
                base_delay_ms: config.socket.base_delay_ms,
                max_delay_ms: config.socket.max_delay_ms,
            },
        }
    }
}

struct Session {
    runner: Arc<SocketModeRunner>,
    pump: JoinHandle<()>,
}

pub struct SlackChannel {
    api: Arc<dyn SlackApi>,
    transport: Arc<dyn SocketTransport>,
    bus: Arc<dyn MessageBus>,
    options: SlackChannelOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    /// Bumped by every `disconnect`; a `connect` that started under an older
    /// value must not publish `Connecting` or `Connected`.
    disconnect_epoch: AtomicU64,
    session: Mutex<Option<Session>>,
}

impl SlackChannel {
    pub fn new(
        api: Arc<dyn SlackApi>,
        transport: Arc<dyn SocketTransport>,
        bus: Arc<dyn MessageBus>,
        options: SlackChannelOptions,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            api,
            transport,
            bus,
            options,
            state: Arc::new(state),
            disconnect_epoch: AtomicU64::new(0),
            session: Mutex::new(None),
        }
    }

    /// Wires the HTTP client and the WebSocket transport from configuration.
    pub fn from_config(config: &AppConfig, bus: Arc<dyn MessageBus>) -> Result<Self, ApiError> {
        let api = Arc::new(HttpSlackApi::from_config(&config.slack)?);
        let transport = Arc::new(WebSocketTransport::new(api.clone(), config.slack.app_token.clone()));
        Ok(Self::new(api, transport, bus, SlackChannelOptions::from_config(config)))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Publishes `next` unless a disconnect was requested after `epoch`.
    /// The check runs under the watch lock, so it cannot interleave with
    /// `disconnect` publishing `Disconnected`.
    fn advance(&self, epoch: u64, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if self.disconnect_epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            *current = next;
            true
        })
    }

    fn cancelled_connect(&self) -> ChannelError {
        info!(
            event_name = "channel.slack.connect_cancelled",
            "disconnect requested while connecting; abandoning connect"
        );
        ChannelError::Transport("disconnect requested while connecting".to_owned())
    }

    async fn post(
        &self,
        format: DeliveryFormat,
        request: PostMessageRequest,
    ) -> Result<DeliveryReceipt, ApiError> {
        let PostedMessage { ts, .. } = self.api.post_message(&request).await?;
        Ok(DeliveryReceipt { format, message_id: Some(ts) })
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|active| !active.pump.is_finished()) {
            return Ok(());
        }
        session.take();

        let epoch = self.disconnect_epoch.load(Ordering::SeqCst);
        if !self.advance(epoch, ConnectionState::Connecting) {
            return Err(self.cancelled_connect());
        }

        let identity = match self.api.auth_test().await {
            Ok(identity) => identity,
            Err(api_error) => {
                error!(
                    event_name = "channel.slack.identity_failed",
                    error = %api_error,
                    "failed to resolve slack bot identity"
                );
                self.set_state(ConnectionState::Disconnected);
                return Err(ChannelError::Identity(api_error.to_string()));
            }
        };
        if self.disconnect_epoch.load(Ordering::SeqCst) != epoch {
            return Err(self.cancelled_connect());
        }

        let handler = Arc::new(InboundHandler::new(
            self.api.clone(),
            self.bus.clone(),
            identity.user_id.clone(),
        ));
        let runner = Arc::new(SocketModeRunner::new(
            self.transport.clone(),
            handler,
            self.options.reconnect_policy.clone(),
        ));

        if let Err(transport_error) = runner.open().await {
            error!(
                event_name = "channel.slack.socket_open_failed",
                error = %transport_error,
                "failed to open slack socket mode session"
            );
            self.set_state(ConnectionState::Disconnected);
            return Err(ChannelError::Transport(transport_error.to_string()));
        }

        if !self.advance(epoch, ConnectionState::Connected) {
            if let Err(transport_error) = self.transport.disconnect().await {
                warn!(
                    event_name = "channel.slack.socket_close_failed",
                    error = %transport_error,
                    "failed to close abandoned socket mode session"
                );
            }
            return Err(self.cancelled_connect());
        }
        let pump = tokio::spawn({
            let runner = runner.clone();
            let state = self.state.clone();
            async move {
                runner.run().await;
                // The pump only ends on its own when reconnection gave up.
                state.send_if_modified(|current| {
                    let was_connected = *current == ConnectionState::Connected;
                    if was_connected {
                        *current = ConnectionState::Disconnected;
                    }
                    was_connected
                });
            }
        });
        *session = Some(Session { runner, pump });

        info!(
            event_name = "channel.slack.connected",
            bot_user_id = %identity.user_id,
            "connected to Slack via Socket Mode"
        );
        Ok(())
    }

    async fn send_message(
        &self,
        jid: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<DeliveryReceipt, ChannelError> {
        let channel = channel_id_from_jid(jid);
        let block_kit = parse_blocks(text, &self.options.block_fallback_text);

        if let Some(payload) = &block_kit {
            match self
                .post(DeliveryFormat::BlockKit, block_kit_message(channel, payload, thread_ts))
                .await
            {
                Ok(receipt) => {
                    info!(
                        event_name = "egress.slack.message_sent",
                        jid,
                        format = DeliveryFormat::BlockKit.label(),
                        block_count = payload.blocks.len(),
                        "Slack Block Kit message sent"
                    );
                    return Ok(receipt);
                }
                Err(api_error) => warn!(
                    event_name = "egress.slack.tier_rejected",
                    jid,
                    format = DeliveryFormat::BlockKit.label(),
                    error = %api_error,
                    "Block Kit rejected by Slack, falling back to markdown"
                ),
            }
        }

        let body = block_kit.as_ref().map_or(text, |payload| payload.fallback_text.as_str());

        match self.post(DeliveryFormat::Markdown, markdown_message(channel, body, thread_ts)).await {
            Ok(receipt) => {
                info!(
                    event_name = "egress.slack.message_sent",
                    jid,
                    format = DeliveryFormat::Markdown.label(),
                    length = body.len(),
                    "Slack markdown message sent"
                );
                return Ok(receipt);
            }
            Err(api_error) => warn!(
                event_name = "egress.slack.tier_rejected",
                jid,
                format = DeliveryFormat::Markdown.label(),
                error = %api_error,
                "markdown block failed, falling back to plain text"
            ),
        }

        match self.post(DeliveryFormat::PlainText, plain_message(channel, body, thread_ts)).await {
            Ok(receipt) => {
                info!(
                    event_name = "egress.slack.message_sent",
                    jid,
                    format = DeliveryFormat::PlainText.label(),
                    length = body.len(),
                    "Slack plain text message sent"
                );
                Ok(receipt)
            }
            Err(api_error) => {
                error!(
                    event_name = "egress.slack.delivery_failed",
                    jid,
                    error = %api_error,
                    "failed to send Slack message"
                );
                Err(ChannelError::Delivery(api_error.to_string()))
            }
        }
    }

    async fn send_ack(&self, jid: &str, thread_ts: Option<&str>) -> BestEffort<String> {
        let request = plain_message(channel_id_from_jid(jid), &self.options.ack_text, thread_ts);
        let outcome: BestEffort<String> =
            self.api.post_message(&request).await.map(|posted| posted.ts).into();
        match &outcome {
            BestEffort::Done(ts) => {
                debug!(event_name = "egress.slack.ack_sent", jid, ts = %ts, "ack message sent");
            }
            BestEffort::Skipped { reason } => warn!(
                event_name = "egress.slack.ack_failed",
                jid,
                error = %reason,
                "failed to send ack message"
            ),
        }
        outcome
    }

    async fn delete_message(&self, jid: &str, message_id: &str) -> BestEffort<()> {
        let outcome: BestEffort<()> =
            self.api.delete_message(channel_id_from_jid(jid), message_id).await.into();
        match &outcome {
            BestEffort::Done(()) => {
                debug!(event_name = "egress.slack.message_deleted", jid, ts = message_id, "ack message deleted");
            }
            BestEffort::Skipped { reason } => warn!(
                event_name = "egress.slack.delete_failed",
                jid,
                ts = message_id,
                error = %reason,
                "failed to delete ack message"
            ),
        }
        outcome
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn owns_jid(&self, jid: &str) -> bool {
        jid.starts_with(JID_PREFIX)
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        self.state.send_modify(|current| {
            self.disconnect_epoch.fetch_add(1, Ordering::SeqCst);
            *current = ConnectionState::Disconnected;
        });

        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.runner.stop();
        if let Err(join_error) = session.pump.await {
            warn!(
                event_name = "channel.slack.pump_aborted",
                error = %join_error,
                "socket mode pump ended abnormally"
            );
        }

        self.transport
            .disconnect()
            .await
            .map_err(|transport_error| ChannelError::Transport(transport_error.to_string()))?;
        info!(event_name = "channel.slack.disconnected", "disconnected from Slack");
        Ok(())
    }
}

/// Turns accepted Slack message events into bus callbacks.
pub struct InboundHandler {
    api: Arc<dyn SlackApi>,
    bus: Arc<dyn MessageBus>,
    bot_user_id: String,
}

impl InboundHandler {
    pub fn new(api: Arc<dyn SlackApi>, bus: Arc<dyn MessageBus>, bot_user_id: String) -> Self {
        Self { api, bus, bot_user_id }
    }

    async fn sender_name(&self, user_id: &str, ctx: &EventContext) -> String {
        let lookup: BestEffort<String> = self
            .api
            .user_info(user_id)
            .await
            .map_err(|api_error| api_error.to_string())
            .and_then(|profile| {
                profile.display_name().map(str::to_owned).ok_or_else(|| "profile carries no name".to_owned())
            })
            .into();
        if let BestEffort::Skipped { reason } = &lookup {
            warn!(
                event_name = "ingress.slack.name_lookup_failed",
                correlation_id = %ctx.correlation_id,
                user_id,
                error = %reason,
                "failed to resolve slack user name"
            );
        }
        lookup.unwrap_or(user_id.to_owned())
    }
}

#[async_trait]
impl EventHandler for InboundHandler {
    async fn handle(&self, envelope: &SlackEnvelope, ctx: &EventContext) -> HandlerResult {
        let event = match &envelope.event {
            SlackEvent::Message(event) => event,
            SlackEvent::Malformed { event_type, reason } => {
                warn!(
                    event_name = "ingress.slack.event_malformed",
                    correlation_id = %ctx.correlation_id,
                    event_type = %event_type,
                    reason = %reason,
                    "discarding malformed slack event"
                );
                return HandlerResult::Ignored(DiscardReason::Malformed(reason.clone()));
            }
            SlackEvent::Unsupported { event_type } => {
                return HandlerResult::Ignored(DiscardReason::UnsupportedEvent(event_type.clone()));
            }
        };

        let message = match screen_message(event) {
            Ok(message) => message,
            Err(reason) => return HandlerResult::Ignored(reason),
        };

        self.bus.on_chat_metadata(
            &message.jid,
            &message.timestamp,
            None,
            CHANNEL_NAME,
            message.is_group,
        );

        if !self.bus.registered_groups().contains_key(&message.jid) {
            return HandlerResult::MetadataOnly;
        }

        let sender_name = self.sender_name(&message.user, ctx).await;
        let is_from_me = message.user == self.bot_user_id;
        let jid = message.jid.clone();
        let record = InboundMessage {
            id: message.ts,
            chat_jid: message.jid,
            sender: message.user,
            sender_name,
            content: message.text,
            timestamp: message.timestamp,
            is_from_me,
            is_bot_message: is_from_me || message.has_bot_id,
            thread_ts: Some(message.thread_ts),
        };

        self.bus.on_message(&jid, record);
        HandlerResult::Delivered
    }
}
