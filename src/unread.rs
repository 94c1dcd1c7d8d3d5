//! Per-conversation unread counts, folded from a live query over `messages`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chat_models::Message;
use crate::storage::{Store, Subscription};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUnread {
    pub chat_id: String,
    pub count: usize,
    pub last_text: String,
    pub last_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub total: usize,
    pub chats: Vec<ChatUnread>,
}

/// Counts unread messages addressed to `me` per chat, skipping system
/// notices, and keeps the newest message's text and time.
pub fn fold(messages: &[Message], me: &str) -> HashMap<String, ChatUnread> {
    let mut counts: HashMap<String, ChatUnread> = HashMap::new();

    for message in messages {
        if message.read || message.is_system_message || message.sender_id == me || message.receiver_id != me {
            continue;
        }

        let entry = counts
            .entry(message.chat_id.clone())
            .or_insert_with(|| ChatUnread {
                chat_id: message.chat_id.clone(),
                count: 0,
                last_text: message.text.clone(),
                last_time: message.timestamp,
            });

        entry.count += 1;
        if message.timestamp >= entry.last_time {
            entry.last_text = message.text.clone();
            entry.last_time = message.timestamp;
        }
    }

    counts
}

/// The local unread view behind the navigation badge.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounts {
    chats: HashMap<String, ChatUnread>,
}

impl UnreadCounts {
    /// Re-derives everything from a snapshot.
    pub fn apply(&mut self, snapshot: &[Message], me: &str) {
        self.chats = fold(snapshot, me);
    }

    /// Drops a chat right away when the user opens it. The per-message read
    /// writes happen separately; until they land, the next snapshot may
    /// bring the chat back.
    pub fn mark_read_local(&mut self, chat_id: &str) {
        self.chats.remove(chat_id);
    }

    pub fn count(&self, chat_id: &str) -> usize {
        self.chats.get(chat_id).map_or(0, |c| c.count)
    }

    pub fn total(&self) -> usize {
        self.chats.values().map(|c| c.count).sum()
    }

    /// Newest activity first.
    pub fn summary(&self) -> UnreadSummary {
        let mut chats: Vec<ChatUnread> = self.chats.values().cloned().collect();
        chats.sort_by(|a, b| b.last_time.cmp(&a.last_time));
        UnreadSummary {
            total: self.total(),
            chats,
        }
    }
}

/// Live query for messages still unread by `uid`.
pub fn watch(store: &Store, uid: &str) -> Subscription<Message> {
    let me = uid.to_string();
    store
        .messages
        .subscribe(move |m: &Message| m.receiver_id == me && m.sender_id != me && !m.read)
}

/// Subscription plus the counts it keeps current. Dropping it unsubscribes.
pub struct UnreadTracker {
    uid: String,
    live: Subscription<Message>,
    counts: UnreadCounts,
}

impl UnreadTracker {
    pub fn subscribe(store: &Store, uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            live: watch(store, uid),
            counts: UnreadCounts::default(),
        }
    }

    /// Waits for the next snapshot and folds it in. Returns `false` when the
    /// feed has closed; the last counts stay in place.
    pub async fn refresh(&mut self) -> bool {
        match self.live.next().await {
            Some(snapshot) => {
                self.counts.apply(&snapshot, &self.uid);
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> &UnreadCounts {
        &self.counts
    }

    pub fn mark_read_local(&mut self, chat_id: &str) {
        self.counts.mark_read_local(chat_id);
    }

    pub fn total(&self) -> usize {
        self.counts.total()
    }
}

/// One-shot fold for callers that do not keep a subscription open.
pub async fn summary(store: &Store, uid: &str) -> anyhow::Result<UnreadSummary> {
    let snapshot = store
        .messages
        .find(|m| m.receiver_id == uid && m.sender_id != uid && !m.read)
        .await?;
    let mut counts = UnreadCounts::default();
    counts.apply(&snapshot, uid);
    Ok(counts.summary())
}
