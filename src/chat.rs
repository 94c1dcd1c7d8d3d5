use crate::chat_models::{Chat, LastMessage, Message};
use crate::error::{ApiError, ApiResult};
use crate::media::{ImageUpload, MediaStore, ObjectPath};
use crate::storage::Store;

const IMAGE_PREVIEW: &str = "Photo";

/// Returns the chat between `a` and `b`, creating it on first contact.
pub async fn open_chat(store: &Store, a: &str, b: &str) -> ApiResult<Chat> {
    if a == b {
        return Err(ApiError::Validation("You cannot message yourself".to_string()));
    }
    let pair = Chat::sorted_pair(a, b);

    let mut chats = store.chats.lock().await;
    if let Some(existing) = chats.iter().find(|c| c.participants == pair) {
        return Ok(existing.clone());
    }

    let chat = Chat::new(a, b);
    chats.push(chat.clone());
    chats.commit()?;

    tracing::info!(chat_id = %chat.id, "Chat created");
    Ok(chat)
}

/// Opens a chat with another user, who must exist.
pub async fn open_chat_with(store: &Store, me: &str, other: &str) -> ApiResult<Chat> {
    if store.users.get(other).await?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    open_chat(store, me, other).await
}

/// Fetches a chat the caller takes part in.
pub async fn member_chat(store: &Store, chat_id: &str, uid: &str) -> ApiResult<Chat> {
    let chat = store
        .chats
        .get(chat_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))?;

    if !chat.has_participant(uid) {
        return Err(ApiError::Forbidden("You are not part of this chat".to_string()));
    }
    Ok(chat)
}

async fn store_message(store: &Store, message: Message) -> ApiResult<Message> {
    let message = store.messages.insert(message).await?;

    let preview = if message.text.is_empty() {
        IMAGE_PREVIEW.to_string()
    } else {
        message.text.clone()
    };
    let last = LastMessage {
        text: preview,
        sender_id: message.sender_id.clone(),
        timestamp: message.timestamp,
    };
    let updated = store
        .chats
        .update(&message.chat_id, |c| {
            c.last_message_time = Some(last.timestamp);
            c.last_message = Some(last);
        })
        .await;

    if let Err(e) = updated {
        if let Err(undo) = store.messages.remove(&message.id).await {
            tracing::error!(message_id = %message.id, error = %undo, "Failed to roll back message");
        }
        return Err(e.into());
    }

    Ok(message)
}

pub async fn send_message(
    store: &Store,
    media: &MediaStore,
    chat_id: &str,
    sender: &str,
    text: &str,
    image: Option<&ImageUpload>,
) -> ApiResult<Message> {
    let text = text.trim();
    if text.is_empty() && image.is_none() {
        return Err(ApiError::Validation("Message cannot be empty".to_string()));
    }

    let chat = member_chat(store, chat_id, sender).await?;
    let receiver = chat
        .other(sender)
        .ok_or_else(|| ApiError::Internal(format!("Chat {} has no second participant", chat.id)))?
        .to_string();

    let stored = match image {
        Some(image) => Some(
            media
                .upload(ObjectPath::ChatImage { chat_id: chat.id.clone() }, image)
                .await?,
        ),
        None => None,
    };

    let mut message = Message::new(chat.id.clone(), sender.to_string(), receiver, text.to_string());
    message.image_url = stored.as_ref().map(|o| o.url.clone());

    match store_message(store, message).await {
        Ok(message) => Ok(message),
        Err(e) => {
            if let Some(object) = stored {
                media.discard(&[object]).await;
            }
            Err(e)
        }
    }
}

/// Auto-generated notice. Never counted as unread.
pub async fn post_system_message(
    store: &Store,
    chat_id: &str,
    sender: &str,
    receiver: &str,
    text: &str,
) -> ApiResult<Message> {
    let message = Message::system(
        chat_id.to_string(),
        sender.to_string(),
        receiver.to_string(),
        text.to_string(),
    );
    store_message(store, message).await
}

pub async fn list_messages(store: &Store, chat_id: &str, viewer: &str) -> ApiResult<Vec<Message>> {
    member_chat(store, chat_id, viewer).await?;

    let mut messages = store.messages.find(|m| m.chat_id == chat_id).await?;
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(messages)
}

/// Flips `read` on a message addressed to the viewer, the write a client
/// issues once the message scrolls into view.
pub async fn mark_read(store: &Store, message_id: &str, viewer: &str) -> ApiResult<Message> {
    let message = store
        .messages
        .get(message_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    if message.receiver_id != viewer {
        return Err(ApiError::Forbidden("Only the receiver can mark a message read".to_string()));
    }
    if message.read {
        return Ok(message);
    }

    store
        .messages
        .update(message_id, |m| m.read = true)
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))
}

/// Chats the user takes part in, most recent activity first.
pub async fn list_chats(store: &Store, uid: &str) -> ApiResult<Vec<Chat>> {
    let mut chats = store.chats.find(|c| c.has_participant(uid)).await?;
    chats.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    Ok(chats)
}
