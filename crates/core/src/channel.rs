use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{group::RegisteredGroup, message::InboundMessage};
use crate::errors::{BestEffort, ChannelError};

/// Callbacks a channel uses to hand inbound traffic to the bus.
pub trait MessageBus: Send + Sync {
    fn on_message(&self, jid: &str, message: InboundMessage);

    /// Fired for every well-formed inbound message, registered or not, so
    /// the bus can discover chats worth registering.
    fn on_chat_metadata(
        &self,
        jid: &str,
        timestamp: &str,
        name: Option<&str>,
        channel: &str,
        is_group: bool,
    );

    fn registered_groups(&self) -> HashMap<String, RegisteredGroup>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryFormat {
    BlockKit,
    Markdown,
    PlainText,
}

impl DeliveryFormat {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BlockKit => "block_kit",
            Self::Markdown => "markdown",
            Self::PlainText => "plain_text",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub format: DeliveryFormat,
    pub message_id: Option<String>,
}

/// The capability set the bus needs from a messaging platform.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), ChannelError>;

    async fn send_message(
        &self,
        jid: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<DeliveryReceipt, ChannelError>;

    /// Posts a short "working on it" marker. Returns the marker's id so it
    /// can be removed later.
    async fn send_ack(&self, jid: &str, thread_ts: Option<&str>) -> BestEffort<String>;

    async fn delete_message(&self, jid: &str, message_id: &str) -> BestEffort<()>;

    fn is_connected(&self) -> bool;

    fn owns_jid(&self, jid: &str) -> bool;

    async fn disconnect(&self) -> Result<(), ChannelError>;
}

/// Picks the channel responsible for `jid` among several.
pub fn route_jid<'a>(channels: &'a [&'a dyn Channel], jid: &str) -> Option<&'a dyn Channel> {
    channels.iter().copied().find(|channel| channel.owns_jid(jid))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{route_jid, Channel, DeliveryFormat, DeliveryReceipt};
    use crate::errors::{BestEffort, ChannelError};

    struct PrefixChannel(&'static str);

    #[async_trait]
    impl Channel for PrefixChannel {
        fn name(&self) -> &str {
            self.0
        }

        async fn connect(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_message(
            &self,
            _jid: &str,
            _text: &str,
            _thread_ts: Option<&str>,
        ) -> Result<DeliveryReceipt, ChannelError> {
            Ok(DeliveryReceipt { format: DeliveryFormat::PlainText, message_id: None })
        }

        async fn send_ack(&self, _jid: &str, _thread_ts: Option<&str>) -> BestEffort<String> {
            BestEffort::skipped("not supported")
        }

        async fn delete_message(&self, _jid: &str, _message_id: &str) -> BestEffort<()> {
            BestEffort::Done(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn owns_jid(&self, jid: &str) -> bool {
            jid.starts_with(&format!("{}:", self.0))
        }

        async fn disconnect(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[test]
    fn routes_to_the_channel_owning_the_namespace() {
        let slack = PrefixChannel("slack");
        let whatsapp = PrefixChannel("whatsapp");
        let channels: [&dyn Channel; 2] = [&slack, &whatsapp];

        let routed = route_jid(&channels, "whatsapp:123").map(|channel| channel.name());
        assert_eq!(routed, Some("whatsapp"));
        assert!(route_jid(&channels, "telegram:1").is_none());
    }

    #[test]
    fn delivery_format_labels_are_stable() {
        assert_eq!(DeliveryFormat::BlockKit.label(), "block_kit");
        assert_eq!(DeliveryFormat::PlainText.label(), "plain_text");
    }
}
