// ============================================================================
// A failed document write leaves neither the document nor its uploads behind
// ============================================================================

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use mangrov::chat;
use mangrov::feed;
use mangrov::media::{ImageUpload, MediaStore};
use mangrov::models::{CreatePostRequest, CreateTradeRequest};
use mangrov::profile;
use mangrov::storage::Store;
use mangrov::trades;
use mangrov::user_models::User;

struct Fixture {
    store: Store,
    media: MediaStore,
    data: TempDir,
    media_dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let data = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        Self {
            store: Store::open(data.path()).unwrap(),
            media: MediaStore::new(media_dir.path().to_path_buf(), "http://localhost:3000"),
            data,
            media_dir,
        }
    }

    /// Replaces `<collection>.json` with a directory so saves fail.
    fn block_writes(&self, collection: &str) {
        let path = self.data.path().join(format!("{}.json", collection));
        if path.exists() {
            fs::remove_file(&path).unwrap();
        }
        fs::create_dir(&path).unwrap();
    }

    fn stored_files(&self) -> usize {
        count_files(self.media_dir.path())
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

fn png() -> ImageUpload {
    ImageUpload {
        filename: "photo.png".to_string(),
        data: STANDARD.encode(b"\x89PNG\r\n"),
    }
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn failed_trade_write_removes_trade_and_image() {
    let fx = Fixture::new();
    fx.block_writes("trades");

    let req: CreateTradeRequest = serde_json::from_value(json!({
        "title": "Bamboo bike",
        "niche": "eco",
        "quantity": 1,
        "image": { "filename": "photo.png", "data": png().data },
    }))
    .unwrap();

    let err = trades::create_trade(&fx.store, &fx.media, "ana", req).await.unwrap_err();
    assert_eq!(err.error_code(), "INTERNAL_ERROR");
    assert!(fx.store.trades.all().await.unwrap().is_empty());
    assert_eq!(fx.stored_files(), 0);
}

#[tokio::test]
async fn failed_post_write_removes_post_and_images() {
    let fx = Fixture::new();
    fx.block_writes("posts");

    let req: CreatePostRequest = serde_json::from_value(json!({
        "title": "Linen shirt",
        "price": 25.0,
        "quantity": 1,
        "niche": "fashion",
        "images": [
            { "filename": "a.png", "data": png().data },
            { "filename": "b.png", "data": png().data },
        ],
    }))
    .unwrap();

    assert!(feed::create_post(&fx.store, &fx.media, "ana", req).await.is_err());
    assert!(fx.store.posts.all().await.unwrap().is_empty());
    assert_eq!(fx.stored_files(), 0);
}

#[tokio::test]
async fn failed_avatar_write_removes_upload() {
    let fx = Fixture::new();
    let user = User::new("ana".to_string(), "ana".to_string(), "Ana".to_string());
    fx.store.users.insert(user).await.unwrap();
    fx.block_writes("users");

    assert!(profile::set_avatar(&fx.store, &fx.media, "ana", &png()).await.is_err());
    assert!(fx.store.users.get("ana").await.unwrap().unwrap().avatar_url.is_none());
    assert_eq!(fx.stored_files(), 0);
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn failed_message_write_removes_image() {
    let fx = Fixture::new();
    let open = chat::open_chat(&fx.store, "ana", "bo").await.unwrap();
    fx.block_writes("messages");

    let result = chat::send_message(&fx.store, &fx.media, &open.id, "ana", "", Some(&png())).await;
    assert!(result.is_err());
    assert!(fx.store.messages.all().await.unwrap().is_empty());
    assert_eq!(fx.stored_files(), 0);
}

#[tokio::test]
async fn failed_chat_update_rolls_back_the_message() {
    let fx = Fixture::new();
    let open = chat::open_chat(&fx.store, "ana", "bo").await.unwrap();
    fx.block_writes("chats");

    let result = chat::send_message(&fx.store, &fx.media, &open.id, "ana", "look", Some(&png())).await;
    assert!(result.is_err());

    // No message pointing at a deleted image, and nothing counted unread.
    assert!(fx.store.messages.all().await.unwrap().is_empty());
    assert_eq!(fx.stored_files(), 0);
    assert_eq!(mangrov::unread::summary(&fx.store, "bo").await.unwrap().total, 0);

    let chat = fx.store.chats.get(&open.id).await.unwrap().unwrap();
    assert!(chat.last_message.is_none());
}
