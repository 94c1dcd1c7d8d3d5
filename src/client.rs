//! HTTP client for the API and the on-disk session the CLI keeps between
//! invocations.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chat_models::{Chat, ChatListResponse, Message, MessageListResponse};
use crate::models::{
    LikeResponse, MatchListResponse, Post, PostPage, SwipeResponse, Trade, TradeListResponse,
};
use crate::trades::QueueMode;
use crate::unread::UnreadSummary;
use crate::user_models::{AuthResponse, User};

pub const SESSION_FILE: &str = ".mangrov-session";

/// Who is signed in on this machine. Created at sign-in, removed at sign-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

impl Session {
    pub fn path() -> PathBuf {
        PathBuf::from(SESSION_FILE)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).context("Failed to write session file")?;
        Ok(())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    pub fn clear_at(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => bail!("{}", body.error.message),
            Err(_) => bail!("Request failed ({}): {}", status, text),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .context("Failed to connect to the Mangrov API. Is the server running?")?;
        let response = Self::check(response).await?;
        response.json().await.context("Failed to parse response")
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        let response = builder
            .send()
            .await
            .context("Failed to connect to the Mangrov API. Is the server running?")?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn sign_up(&self, email: &str, password: &str, username: &str, display_name: &str) -> Result<AuthResponse> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "username": username,
            "displayName": display_name,
        });
        self.send_json(self.request(Method::POST, "/auth/signup").json(&body)).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.send_json(self.request(Method::POST, "/auth/signin").json(&body)).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.send_empty(self.request(Method::POST, "/auth/signout")).await
    }

    pub async fn me(&self) -> Result<User> {
        self.send_json(self.request(Method::GET, "/me")).await
    }

    pub async fn update_profile(&self, body: &serde_json::Value) -> Result<User> {
        self.send_json(self.request(Method::PUT, "/me").json(body)).await
    }

    pub async fn user(&self, username: &str) -> Result<User> {
        self.send_json(self.request(Method::GET, &format!("/users/{}", username)))
            .await
    }

    pub async fn feed(&self, query: &[(&str, String)]) -> Result<PostPage> {
        self.send_json(self.request(Method::GET, "/posts").query(query)).await
    }

    pub async fn post(&self, id: &str) -> Result<Post> {
        self.send_json(self.request(Method::GET, &format!("/posts/{}", id)))
            .await
    }

    pub async fn create_post(&self, body: &serde_json::Value) -> Result<Post> {
        self.send_json(self.request(Method::POST, "/posts").json(body)).await
    }

    pub async fn toggle_like(&self, post_id: &str) -> Result<LikeResponse> {
        self.send_json(self.request(Method::POST, &format!("/posts/{}/like", post_id)))
            .await
    }

    pub async fn create_trade(&self, body: &serde_json::Value) -> Result<Trade> {
        self.send_json(self.request(Method::POST, "/trades").json(body)).await
    }

    pub async fn trade_queue(&self, mode: QueueMode) -> Result<Vec<Trade>> {
        let mode = match mode {
            QueueMode::Interests => "interests",
            QueueMode::Random => "random",
        };
        let list: TradeListResponse = self
            .send_json(self.request(Method::GET, "/trades/queue").query(&[("mode", mode)]))
            .await?;
        Ok(list.trades)
    }

    pub async fn picker(&self) -> Result<Vec<Trade>> {
        let list: TradeListResponse = self
            .send_json(self.request(Method::GET, "/trades/picker"))
            .await?;
        Ok(list.trades)
    }

    pub async fn like_trade(&self, trade_id: &str) -> Result<SwipeResponse> {
        self.send_json(self.request(Method::POST, &format!("/trades/{}/like", trade_id)))
            .await
    }

    pub async fn offer_trade(&self, trade_id: &str, offered_item: &str) -> Result<SwipeResponse> {
        let body = serde_json::json!({ "offeredItem": offered_item });
        self.send_json(
            self.request(Method::POST, &format!("/trades/{}/offer", trade_id))
                .json(&body),
        )
        .await
    }

    pub async fn matches(&self) -> Result<MatchListResponse> {
        self.send_json(self.request(Method::GET, "/matches")).await
    }

    pub async fn chats(&self) -> Result<Vec<Chat>> {
        let list: ChatListResponse = self.send_json(self.request(Method::GET, "/chats")).await?;
        Ok(list.chats)
    }

    pub async fn open_chat(&self, user_id: &str) -> Result<Chat> {
        let body = serde_json::json!({ "userId": user_id });
        self.send_json(self.request(Method::POST, "/chats").json(&body)).await
    }

    pub async fn messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let list: MessageListResponse = self
            .send_json(self.request(Method::GET, &format!("/chats/{}/messages", chat_id)))
            .await?;
        Ok(list.messages)
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<Message> {
        let body = serde_json::json!({ "text": text });
        self.send_json(
            self.request(Method::POST, &format!("/chats/{}/messages", chat_id))
                .json(&body),
        )
        .await
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<Message> {
        self.send_json(self.request(Method::POST, &format!("/messages/{}/read", message_id)))
            .await
    }

    pub async fn unread(&self) -> Result<UnreadSummary> {
        self.send_json(self.request(Method::GET, "/unread")).await
    }
}

/// Loads the session or explains how to get one.
pub fn require_session(path: &Path) -> Result<Session> {
    Session::load_from(path)
        .ok_or_else(|| anyhow!("You must be signed in. Use: mangrov signin -e <email> -p <password>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);

        assert!(require_session(&path).is_err());

        let session = Session {
            token: "t".to_string(),
            user_id: "u1".to_string(),
            username: "ana".to_string(),
        };
        session.save_to(&path).unwrap();
        assert_eq!(require_session(&path).unwrap().username, "ana");

        Session::clear_at(&path).unwrap();
        assert!(Session::load_from(&path).is_none());
        Session::clear_at(&path).unwrap();
    }
}
