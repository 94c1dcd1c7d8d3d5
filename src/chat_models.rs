use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::ImageUpload;
use crate::storage::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Two-party conversation. `participants` is always sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub participants: [String; 2],
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn new(a: &str, b: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            participants: Self::sorted_pair(a, b),
            last_message: None,
            last_message_time: None,
        }
    }

    pub fn sorted_pair(a: &str, b: &str) -> [String; 2] {
        if a <= b {
            [a.to_string(), b.to_string()]
        } else {
            [b.to_string(), a.to_string()]
        }
    }

    pub fn has_participant(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }

    /// The participant that is not `uid`.
    pub fn other(&self, uid: &str) -> Option<&str> {
        if !self.has_participant(uid) {
            return None;
        }
        self.participants
            .iter()
            .find(|p| p.as_str() != uid)
            .map(String::as_str)
    }
}

impl Document for Chat {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub is_system_message: bool,
}

impl Message {
    pub fn new(chat_id: String, sender_id: String, receiver_id: String, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            sender_id,
            receiver_id,
            text,
            image_url: None,
            timestamp: Utc::now(),
            read: false,
            is_system_message: false,
        }
    }

    pub fn system(chat_id: String, sender_id: String, receiver_id: String, text: String) -> Self {
        Self {
            is_system_message: true,
            ..Self::new(chat_id, sender_id, receiver_id, text)
        }
    }
}

impl Document for Message {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}
