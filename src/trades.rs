//! Trade listings and the swipe queue built from them.

use anyhow::Result;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::media::{MediaStore, ObjectPath};
use crate::models::{CreateTradeRequest, Trade};
use crate::storage::Store;
use crate::validation;

/// Largest tag set a single "niche in (...)" query may carry.
pub const NICHE_BATCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    #[default]
    Interests,
    Random,
}

/// Cursor over the candidates of one swipe session.
#[derive(Debug, Clone, Default)]
pub struct TradeQueue {
    items: Vec<Trade>,
    cursor: usize,
}

impl TradeQueue {
    pub fn new(items: Vec<Trade>) -> Self {
        Self { items, cursor: 0 }
    }

    /// `None` once the queue is exhausted.
    pub fn current(&self) -> Option<&Trade> {
        self.items.get(self.cursor)
    }

    pub fn advance(&mut self) {
        if self.cursor < self.items.len() {
            self.cursor += 1;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.cursor)
    }

    /// Swaps in a freshly loaded set and rewinds.
    pub fn reset(&mut self, items: Vec<Trade>) {
        self.items = items;
        self.cursor = 0;
    }
}

async fn fetch_candidates(store: &Store, viewer: &str, mode: QueueMode, interests: &[String]) -> Result<Vec<Trade>> {
    let candidate = |t: &Trade| t.uid != viewer && t.available;

    match mode {
        QueueMode::Random => {
            let mut items = store.trades.find(candidate).await?;
            items.shuffle(&mut rand::thread_rng());
            Ok(items)
        }
        QueueMode::Interests => {
            let mut seen = HashSet::new();
            let mut items = Vec::new();
            for batch in interests.chunks(NICHE_BATCH_LIMIT) {
                let found = store
                    .trades
                    .find(|t| candidate(t) && t.in_niches(batch))
                    .await?;
                for trade in found {
                    if seen.insert(trade.id.clone()) {
                        items.push(trade);
                    }
                }
            }
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(items)
        }
    }
}

/// Candidates for `viewer`. A failed read yields an empty queue.
pub async fn load_queue(store: &Store, viewer: &str, mode: QueueMode) -> Vec<Trade> {
    let interests = match store.users.get(viewer).await {
        Ok(Some(user)) => user.interests,
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(uid = %viewer, error = %e, "Failed to read interests for trade queue");
            return Vec::new();
        }
    };

    match fetch_candidates(store, viewer, mode, &interests).await {
        Ok(items) => {
            tracing::debug!(uid = %viewer, ?mode, count = items.len(), "Loaded trade queue");
            items
        }
        Err(e) => {
            tracing::warn!(uid = %viewer, error = %e, "Failed to load trade queue");
            Vec::new()
        }
    }
}

pub async fn create_trade(store: &Store, media: &MediaStore, uid: &str, req: CreateTradeRequest) -> ApiResult<Trade> {
    validation::require("Title", &req.title)?;
    validation::require("Niche", &req.niche)?;
    if req.quantity == 0 {
        return Err(ApiError::Validation("Quantity must be at least 1".to_string()));
    }

    let stored = match &req.image {
        Some(image) => Some(media.upload(ObjectPath::TradeImage, image).await?),
        None => None,
    };

    let trade = Trade {
        id: Uuid::new_v4().to_string(),
        uid: uid.to_string(),
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        image: stored.as_ref().map(|o| o.url.clone()),
        niche: req.niche.trim().to_lowercase(),
        tags: validation::normalize_tags(&req.tags),
        quantity: req.quantity,
        available: true,
        created_at: Utc::now(),
    };

    match store.trades.insert(trade).await {
        Ok(trade) => {
            tracing::info!(trade_id = %trade.id, uid = %uid, "Trade listed");
            Ok(trade)
        }
        Err(e) => {
            if let Some(object) = stored {
                media.discard(&[object]).await;
            }
            Err(e.into())
        }
    }
}

pub async fn get_trade(store: &Store, trade_id: &str) -> ApiResult<Trade> {
    store
        .trades
        .get(trade_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Trade not found".to_string()))
}

pub async fn my_trades(store: &Store, uid: &str) -> ApiResult<Vec<Trade>> {
    let mut trades = store.trades.find(|t| t.uid == uid).await?;
    trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(trades)
}

/// The viewer's own listings that can still be offered.
pub async fn picker(store: &Store, uid: &str) -> ApiResult<Vec<Trade>> {
    let mut trades = store.trades.find(|t| t.uid == uid && t.available).await?;
    trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(trades)
}

pub async fn set_availability(store: &Store, uid: &str, trade_id: &str, available: bool) -> ApiResult<Trade> {
    let trade = get_trade(store, trade_id).await?;
    if trade.uid != uid {
        return Err(ApiError::Forbidden("You can only change your own trades".to_string()));
    }

    store
        .trades
        .update(trade_id, |t| t.available = available)
        .await?
        .ok_or_else(|| ApiError::NotFound("Trade not found".to_string()))
}
