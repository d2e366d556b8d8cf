use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const JID_PREFIX: &str = "slack:";

const FILE_SHARE_SUBTYPE: &str = "file_share";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Malformed { event_type: String, reason: String },
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Message(_) => "message",
            Self::Malformed { event_type, .. } | Self::Unsupported { event_type } => event_type,
        }
    }
}

/// A `message` event as Slack delivers it. Every field except the channel
/// and `ts` is optional because system subtypes omit them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    pub channel: String,
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("socket frame has no `{0}` field")]
    MissingField(&'static str),
}

impl SlackEnvelope {
    /// Interprets one Socket Mode frame that carries an `envelope_id`.
    pub fn from_frame(frame: &Value) -> Result<Self, EnvelopeError> {
        let envelope_id = frame
            .get("envelope_id")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("envelope_id"))?
            .to_owned();
        let envelope_type =
            frame.get("type").and_then(Value::as_str).ok_or(EnvelopeError::MissingField("type"))?;

        let event = if envelope_type == "events_api" {
            match frame.get("payload").and_then(|payload| payload.get("event")) {
                Some(event) => parse_event(event),
                None => SlackEvent::Malformed {
                    event_type: envelope_type.to_owned(),
                    reason: "events_api payload without event".to_owned(),
                },
            }
        } else {
            SlackEvent::Unsupported { event_type: envelope_type.to_owned() }
        };

        Ok(Self { envelope_id, event })
    }
}

fn parse_event(event: &Value) -> SlackEvent {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
    if event_type != "message" {
        return SlackEvent::Unsupported { event_type: event_type.to_owned() };
    }

    match MessageEvent::deserialize(event) {
        Ok(message) => SlackEvent::Message(message),
        Err(error) => {
            SlackEvent::Malformed { event_type: event_type.to_owned(), reason: error.to_string() }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    DisallowedSubtype(String),
    MissingText,
    MissingUser,
    InvalidTimestamp(String),
    Malformed(String),
    UnsupportedEvent(String),
}

/// A message that passed the subtype/text/user screen, with everything
/// derivable from the event alone already computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenedMessage {
    pub jid: String,
    pub channel_id: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    pub timestamp: String,
    pub thread_ts: String,
    pub is_group: bool,
    pub has_bot_id: bool,
}

pub fn screen_message(event: &MessageEvent) -> Result<ScreenedMessage, DiscardReason> {
    if let Some(subtype) = event.subtype.as_deref() {
        if subtype != FILE_SHARE_SUBTYPE {
            return Err(DiscardReason::DisallowedSubtype(subtype.to_owned()));
        }
    }

    let text = match event.text.as_deref() {
        Some(text) if !text.is_empty() => text,
        _ => return Err(DiscardReason::MissingText),
    };
    let Some(user) = event.user.as_deref() else {
        return Err(DiscardReason::MissingUser);
    };
    let Some(timestamp) = ts_to_iso8601(&event.ts) else {
        return Err(DiscardReason::InvalidTimestamp(event.ts.clone()));
    };

    Ok(ScreenedMessage {
        jid: slack_jid(&event.channel),
        channel_id: event.channel.clone(),
        user: user.to_owned(),
        text: text.to_owned(),
        ts: event.ts.clone(),
        timestamp,
        thread_ts: event.thread_ts.clone().unwrap_or_else(|| event.ts.clone()),
        is_group: is_group_channel(&event.channel),
        has_bot_id: event.bot_id.as_deref().is_some_and(|bot_id| !bot_id.is_empty()),
    })
}

pub fn slack_jid(channel_id: &str) -> String {
    format!("{JID_PREFIX}{channel_id}")
}

pub fn channel_id_from_jid(jid: &str) -> &str {
    jid.strip_prefix(JID_PREFIX).unwrap_or(jid)
}

/// Public (`C…`) and private (`G…`) channels are groups; everything else,
/// notably `D…` direct messages, is not.
pub fn is_group_channel(channel_id: &str) -> bool {
    channel_id.starts_with('C') || channel_id.starts_with('G')
}

/// Converts a Slack `ts` (`<seconds>.<micros>`) into an ISO-8601 UTC string
/// with millisecond precision. Sub-millisecond digits are truncated.
pub fn ts_to_iso8601(ts: &str) -> Option<String> {
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, ""));
    if seconds.is_empty() || !seconds.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let seconds: i64 = seconds.parse().ok()?;
    let millis_digits: String = fraction.chars().chain("000".chars()).take(3).collect();
    let millis: i64 = millis_digits.parse().ok()?;

    let instant = DateTime::from_timestamp_millis(seconds.checked_mul(1_000)?.checked_add(millis)?)?;
    Some(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// Full record handed to the bus.
    Delivered,
    /// Chat announced to the bus, but it is not registered.
    MetadataOnly,
    Ignored(DiscardReason),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &SlackEnvelope, ctx: &EventContext) -> HandlerResult;
}
