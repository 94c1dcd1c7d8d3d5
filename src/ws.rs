//! WebSocket push of the unread badge.
//!
//! The client connects to `/ws/unread?token=...` and receives an
//! [`UnreadSummary`] on connect and after every change to its unread set. It
//! may send `{"type":"mark_read","chatId":"..."}` to clear a chat locally.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;
use crate::unread::{self, UnreadCounts, UnreadSummary};

#[derive(Debug, Deserialize)]
pub struct WsAuth {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    MarkRead { chat_id: String },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Unread { summary: UnreadSummary },
    Pong,
    Error { message: String },
}

pub async fn unread_ws(
    ws: WebSocketUpgrade,
    Query(auth): Query<WsAuth>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let uid = state
        .auth
        .resolve(&auth.token)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Session expired, please sign in again".to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, uid)))
}

async fn send(sender: &mut (impl SinkExt<WsMessage> + Unpin), message: &ServerMessage) -> bool {
    let Ok(text) = serde_json::to_string(message) else {
        return false;
    };
    sender.send(WsMessage::Text(text)).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, uid: String) {
    tracing::info!(uid = %uid, "Unread stream connected");

    let (mut sender, mut receiver) = socket.split();
    let mut live = unread::watch(&state.store, &uid);
    let mut counts = UnreadCounts::default();

    loop {
        tokio::select! {
            snapshot = live.next() => {
                let Some(snapshot) = snapshot else { break };
                counts.apply(&snapshot, &uid);
                if !send(&mut sender, &ServerMessage::Unread { summary: counts.summary() }).await {
                    break;
                }
            }
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(uid = %uid, error = %e, "Unread stream receive error");
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::MarkRead { chat_id }) => {
                        counts.mark_read_local(&chat_id);
                        ServerMessage::Unread { summary: counts.summary() }
                    }
                    Ok(ClientMessage::Ping) => ServerMessage::Pong,
                    Err(e) => ServerMessage::Error { message: format!("Invalid message: {}", e) },
                };
                if !send(&mut sender, &reply).await {
                    break;
                }
            }
        }
    }

    // Dropping `live` closes the subscription.
    tracing::info!(uid = %uid, "Unread stream disconnected");
}
