use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use slackbridge_core::config::GroupConfig;
use slackbridge_core::{ChatMetadata, InboundMessage, MessageBus, RegisteredGroup};
use tracing::{debug, info};

/// Host-side bus: registered groups come from the `[[groups]]` config table,
/// delivered messages and discovered chats are logged.
pub struct ConfiguredBus {
    groups: HashMap<String, RegisteredGroup>,
    chats: Mutex<HashMap<String, ChatMetadata>>,
    delivered: AtomicU64,
}

impl ConfiguredBus {
    pub fn from_groups(groups: &[GroupConfig]) -> Self {
        let groups = groups
            .iter()
            .map(|group| (group.jid.clone(), RegisteredGroup::new(group.name.clone())))
            .collect();
        Self { groups, chats: Mutex::new(HashMap::new()), delivered: AtomicU64::new(0) }
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Latest metadata per chat seen so far, registered or not.
    pub fn discovered_chats(&self) -> Vec<ChatMetadata> {
        let chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        let mut chats: Vec<_> = chats.values().cloned().collect();
        chats.sort_by(|left, right| left.jid.cmp(&right.jid));
        chats
    }
}

impl MessageBus for ConfiguredBus {
    fn on_message(&self, jid: &str, message: InboundMessage) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!(
            event_name = "bus.message.received",
            jid,
            message_id = %message.id,
            sender = %message.sender,
            sender_name = %message.sender_name,
            is_bot_message = message.is_bot_message,
            thread_ts = message.thread_ts.as_deref().unwrap_or(""),
            "inbound message delivered"
        );
    }

    fn on_chat_metadata(
        &self,
        jid: &str,
        timestamp: &str,
        name: Option<&str>,
        channel: &str,
        is_group: bool,
    ) {
        let metadata = ChatMetadata {
            jid: jid.to_owned(),
            timestamp: timestamp.to_owned(),
            name: name.map(str::to_owned),
            channel: channel.to_owned(),
            is_group,
        };

        let first_seen = {
            let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
            chats.insert(jid.to_owned(), metadata).is_none()
        };

        if first_seen {
            info!(
                event_name = "bus.chat.discovered",
                jid,
                channel,
                is_group,
                registered = self.groups.contains_key(jid),
                "new chat discovered"
            );
        } else {
            debug!(event_name = "bus.chat.activity", jid, timestamp, "chat activity");
        }
    }

    fn registered_groups(&self) -> HashMap<String, RegisteredGroup> {
        self.groups.clone()
    }
}
