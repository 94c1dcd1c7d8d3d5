// ============================================================================
// Live unread badge over /ws/unread
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as Frame, MaybeTlsStream, WebSocketStream};

use mangrov::chat;
use mangrov::media::MediaStore;
use mangrov::storage::Store;
use mangrov::user_models::SignUpRequest;
use mangrov::{router, AppState};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    state: Arc<AppState>,
    _media: TempDir,
}

impl Server {
    async fn start() -> Self {
        let media = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState::new(
            Arc::new(Store::in_memory()),
            MediaStore::new(media.path().to_path_buf(), "http://localhost:3000"),
            4,
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            _media: media,
        }
    }

    /// Signs up and returns (token, uid).
    async fn user(&self, username: &str) -> (String, String) {
        let created = self
            .state
            .auth
            .sign_up(SignUpRequest {
                email: format!("{}@example.com", username),
                password: "Abcdef1!".to_string(),
                username: username.to_string(),
                display_name: username.to_string(),
            })
            .await
            .unwrap();
        (created.token, created.user.id)
    }

    async fn connect(&self, token: &str) -> Socket {
        let url = format!("ws://{}/ws/unread?token={}", self.addr, token);
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no push from server")
            .expect("socket closed")
            .unwrap();
        if let Frame::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Frame::Text(value.to_string())).await.unwrap();
}

// ============================================================================
// Pushes
// ============================================================================

#[tokio::test]
async fn pushes_summary_on_connect_and_on_every_change() {
    let server = Server::start().await;
    let (_, ana) = server.user("ana").await;
    let (bo_token, bo) = server.user("bo").await;
    let open = chat::open_chat(&server.state.store, &ana, &bo).await.unwrap();

    let mut socket = server.connect(&bo_token).await;
    let first = next_json(&mut socket).await;
    assert_eq!(first["type"], "unread");
    assert_eq!(first["summary"]["total"], 0);

    let sent = chat::send_message(&server.state.store, &server.state.media, &open.id, &ana, "hi", None)
        .await
        .unwrap();
    let pushed = next_json(&mut socket).await;
    assert_eq!(pushed["summary"]["total"], 1);
    assert_eq!(pushed["summary"]["chats"][0]["chatId"], open.id.as_str());
    assert_eq!(pushed["summary"]["chats"][0]["lastText"], "hi");

    chat::mark_read(&server.state.store, &sent.id, &bo).await.unwrap();
    let pushed = next_json(&mut socket).await;
    assert_eq!(pushed["summary"]["total"], 0);
}

#[tokio::test]
async fn own_messages_do_not_push_unread() {
    let server = Server::start().await;
    let (_, ana) = server.user("ana").await;
    let (bo_token, bo) = server.user("bo").await;
    let open = chat::open_chat(&server.state.store, &ana, &bo).await.unwrap();

    let mut socket = server.connect(&bo_token).await;
    next_json(&mut socket).await;

    chat::send_message(&server.state.store, &server.state.media, &open.id, &bo, "mine", None)
        .await
        .unwrap();
    let pushed = next_json(&mut socket).await;
    assert_eq!(pushed["summary"]["total"], 0);
}

// ============================================================================
// Client messages
// ============================================================================

#[tokio::test]
async fn mark_read_clears_chat_locally() {
    let server = Server::start().await;
    let (_, ana) = server.user("ana").await;
    let (bo_token, bo) = server.user("bo").await;
    let open = chat::open_chat(&server.state.store, &ana, &bo).await.unwrap();
    chat::send_message(&server.state.store, &server.state.media, &open.id, &ana, "hi", None)
        .await
        .unwrap();

    let mut socket = server.connect(&bo_token).await;
    assert_eq!(next_json(&mut socket).await["summary"]["total"], 1);

    send_json(&mut socket, json!({ "type": "mark_read", "chatId": open.id })).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "unread");
    assert_eq!(reply["summary"]["total"], 0);

    // The stored message is still unread; only the badge was cleared.
    assert_eq!(mangrov::unread::summary(&server.state.store, &bo).await.unwrap().total, 1);
}

#[tokio::test]
async fn ping_and_malformed_messages() {
    let server = Server::start().await;
    let (token, _) = server.user("ana").await;

    let mut socket = server.connect(&token).await;
    next_json(&mut socket).await;

    send_json(&mut socket, json!({ "type": "ping" })).await;
    assert_eq!(next_json(&mut socket).await["type"], "pong");

    socket.send(Frame::Text("not json".to_string())).await.unwrap();
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("Invalid message"));
}

#[tokio::test]
async fn rejects_unknown_token() {
    let server = Server::start().await;
    let url = format!("ws://{}/ws/unread?token=bogus", server.addr);
    assert!(connect_async(url).await.is_err());
}
