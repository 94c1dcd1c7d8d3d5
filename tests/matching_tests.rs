// ============================================================================
// Match ledger tests driven straight through the service layer
// ============================================================================

use chrono::Utc;
use std::sync::Arc;

use mangrov::chat;
use mangrov::matching;
use mangrov::models::{Trade, TradeMatch};
use mangrov::storage::Store;
use mangrov::unread;

async fn list(store: &Store, id: &str, owner: &str, niche: &str) -> Trade {
    let trade = Trade {
        id: id.to_string(),
        uid: owner.to_string(),
        title: format!("Item {}", id),
        description: String::new(),
        image: None,
        niche: niche.to_string(),
        tags: Vec::new(),
        quantity: 1,
        available: true,
        created_at: Utc::now(),
    };
    store.trades.insert(trade).await.unwrap()
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_likes_converge_on_one_record() {
    let store = Arc::new(Store::in_memory());
    list(&store, "t", "bob", "eco").await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            matching::like(&store, "alice", "t").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = store.trade_matches.all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, TradeMatch::key("alice", "bob", "t"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crossing_likes_open_exactly_one_chat() {
    let store = Arc::new(Store::in_memory());
    list(&store, "t", "bob", "eco").await;
    list(&store, "x", "alice", "books").await;

    let a = {
        let store = store.clone();
        tokio::spawn(async move { matching::like(&store, "alice", "t").await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { matching::like(&store, "bob", "x").await })
    };
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    // Whichever landed second turned the single record mutual.
    assert_eq!(a.trade_match.id, b.trade_match.id);
    assert!(a.mutual || b.mutual);
    assert_eq!(a.chat_id.is_some() as u8 + b.chat_id.is_some() as u8, 1);

    let records = store.trade_matches.all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_mutual());

    let chats = store.chats.all().await.unwrap();
    assert_eq!(chats.len(), 1);
    let messages = store.messages.all().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_system_message);
}

// ============================================================================
// Ledger semantics
// ============================================================================

#[tokio::test]
async fn like_fills_missing_offer_with_candidate() {
    let store = Store::in_memory();
    list(&store, "t", "bob", "eco").await;
    list(&store, "x", "alice", "books").await;

    matching::like(&store, "alice", "t").await.unwrap();
    let outcome = matching::like(&store, "bob", "x").await.unwrap();

    assert!(outcome.mutual);
    assert_eq!(outcome.trade_match.from_user, "alice");
    assert_eq!(outcome.trade_match.from_item, "x");
    assert_eq!(outcome.trade_match.to_item, "t");
}

#[tokio::test]
async fn offer_rejects_unavailable_items() {
    let store = Store::in_memory();
    list(&store, "t", "bob", "eco").await;
    list(&store, "x", "alice", "books").await;
    store.trades.update("x", |t| t.available = false).await.unwrap();

    assert!(matching::offer(&store, "alice", "t", "x").await.is_err());
    assert!(store.trade_matches.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn offer_after_like_updates_the_same_record() {
    let store = Store::in_memory();
    list(&store, "t", "bob", "eco").await;
    list(&store, "x", "alice", "books").await;

    matching::like(&store, "alice", "t").await.unwrap();
    let outcome = matching::offer(&store, "alice", "t", "x").await.unwrap();

    assert!(!outcome.mutual);
    assert_eq!(outcome.trade_match.from_item, "x");
    assert_eq!(store.trade_matches.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_mutual_like_does_not_announce_twice() {
    let store = Store::in_memory();
    list(&store, "t", "bob", "eco").await;
    list(&store, "x", "alice", "books").await;

    matching::like(&store, "alice", "t").await.unwrap();
    let first = matching::like(&store, "bob", "x").await.unwrap();
    let second = matching::like(&store, "bob", "x").await.unwrap();

    assert!(first.chat_id.is_some());
    assert!(second.chat_id.is_none());
    assert!(second.mutual);
    assert_eq!(store.messages.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn matches_list_both_sides() {
    let store = Store::in_memory();
    list(&store, "t", "bob", "eco").await;
    matching::like(&store, "alice", "t").await.unwrap();

    assert_eq!(matching::matches_for(&store, "alice").await.unwrap().len(), 1);
    assert_eq!(matching::matches_for(&store, "bob").await.unwrap().len(), 1);
    assert!(matching::matches_for(&store, "carol").await.unwrap().is_empty());
}

// ============================================================================
// Match notice and unread counts
// ============================================================================

#[tokio::test]
async fn match_notice_is_not_unread() {
    let store = Store::in_memory();
    list(&store, "t", "bob", "eco").await;
    list(&store, "x", "alice", "books").await;

    matching::like(&store, "alice", "t").await.unwrap();
    let outcome = matching::like(&store, "bob", "x").await.unwrap();
    let chat_id = outcome.chat_id.unwrap();

    let chats = chat::list_chats(&store, "alice").await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, chat_id);

    assert_eq!(unread::summary(&store, "alice").await.unwrap().total, 0);
    assert_eq!(unread::summary(&store, "bob").await.unwrap().total, 0);
}
