//! The match ledger: swipe decisions become `TradeMatch` records.
//!
//! Every decision runs its lookup and its write under one write guard on
//! `tradeMatches`, and proposals use the deterministic key from
//! [`TradeMatch::key`], so two proposals by the same user on the same target
//! item always converge on one record.

use chrono::Utc;

use crate::chat;
use crate::error::{ApiError, ApiResult};
use crate::models::{Trade, TradeMatch};
use crate::storage::Store;
use crate::trades;

#[derive(Debug, Clone)]
pub struct SwipeOutcome {
    pub trade_match: TradeMatch,
    /// Both sides have now liked.
    pub mutual: bool,
    /// Set when this decision turned the record mutual.
    pub chat_id: Option<String>,
}

/// Index of the record in which `owner` already targeted one of `viewer`'s
/// items. Records already pairing `candidate_item` win, then ones not yet
/// liked back.
fn reciprocal_index<'a>(
    records: impl Iterator<Item = &'a TradeMatch>,
    owner: &str,
    viewer: &str,
    candidate_item: &str,
    target_item: Option<&str>,
) -> Option<usize> {
    records
        .enumerate()
        .filter(|(_, m)| m.from_user == owner && m.to_user == viewer)
        .filter(|(_, m)| target_item.map_or(true, |item| m.to_item == item))
        .filter(|(_, m)| m.from_item.is_empty() || m.from_item == candidate_item)
        .min_by_key(|(_, m)| (m.from_item != candidate_item, m.to_liked))
        .map(|(i, _)| i)
}

async fn candidate_for(store: &Store, viewer: &str, candidate_id: &str) -> ApiResult<Trade> {
    let candidate = trades::get_trade(store, candidate_id).await?;
    if candidate.uid == viewer {
        return Err(ApiError::Validation("You cannot trade with yourself".to_string()));
    }
    Ok(candidate)
}

/// Swipe right on `candidate_id`.
pub async fn like(store: &Store, viewer: &str, candidate_id: &str) -> ApiResult<SwipeOutcome> {
    let candidate = candidate_for(store, viewer, candidate_id).await?;
    record_decision(store, viewer, &candidate, None).await
}

/// Offer `offered_item` (one of the viewer's listings) for `candidate_id`.
pub async fn offer(store: &Store, viewer: &str, candidate_id: &str, offered_item: &str) -> ApiResult<SwipeOutcome> {
    let candidate = candidate_for(store, viewer, candidate_id).await?;

    let offered = trades::get_trade(store, offered_item).await?;
    if offered.uid != viewer {
        return Err(ApiError::Forbidden("You can only offer your own items".to_string()));
    }
    if !offered.available {
        return Err(ApiError::Validation("That item is no longer available".to_string()));
    }

    record_decision(store, viewer, &candidate, Some(&offered)).await
}

async fn record_decision(
    store: &Store,
    viewer: &str,
    candidate: &Trade,
    offered: Option<&Trade>,
) -> ApiResult<SwipeOutcome> {
    let owner = candidate.uid.as_str();
    let offered_id = offered.map(|t| t.id.as_str());
    let now = Utc::now();

    let mut ledger = store.trade_matches.lock().await;

    let reciprocal = reciprocal_index(ledger.iter(), owner, viewer, &candidate.id, offered_id);

    let (record, was_mutual) = match reciprocal {
        Some(index) => {
            let record = ledger
                .get_mut(index)
                .ok_or_else(|| ApiError::Internal("Match ledger index out of range".to_string()))?;
            let was_mutual = record.is_mutual();
            record.to_liked = true;
            if record.from_item.is_empty() {
                record.from_item = candidate.id.clone();
            }
            record.timestamp = now;
            (record.clone(), was_mutual)
        }
        None => {
            let key = TradeMatch::key(viewer, owner, &candidate.id);
            match ledger.find_mut(|m| m.id == key) {
                Some(record) => {
                    let was_mutual = record.is_mutual();
                    record.from_liked = true;
                    if let Some(item) = offered_id {
                        record.from_item = item.to_string();
                    }
                    record.timestamp = now;
                    (record.clone(), was_mutual)
                }
                None => {
                    let record = TradeMatch::propose(viewer, owner, &candidate.id, offered_id);
                    ledger.push(record.clone());
                    (record, false)
                }
            }
        }
    };

    ledger.commit()?;

    tracing::info!(
        match_id = %record.id,
        from = %record.from_user,
        to = %record.to_user,
        mutual = record.is_mutual(),
        "Recorded trade decision"
    );

    let chat_id = if record.is_mutual() && !was_mutual {
        Some(announce_match(store, &record).await?)
    } else {
        None
    };

    Ok(SwipeOutcome {
        mutual: record.is_mutual(),
        trade_match: record,
        chat_id,
    })
}

/// Opens the pair's chat and drops a system notice into it.
async fn announce_match(store: &Store, record: &TradeMatch) -> ApiResult<String> {
    let chat = chat::open_chat(store, &record.from_user, &record.to_user).await?;

    let wanted = store
        .trades
        .get(&record.to_item)
        .await?
        .map(|t| t.title)
        .unwrap_or_else(|| "an item".to_string());

    chat::post_system_message(
        store,
        &chat.id,
        &record.from_user,
        &record.to_user,
        &format!("You matched! Trade talk for \"{}\" can start here.", wanted),
    )
    .await?;

    Ok(chat.id)
}

/// Every record the user is on either side of, newest first.
pub async fn matches_for(store: &Store, uid: &str) -> ApiResult<Vec<TradeMatch>> {
    let mut records = store.trade_matches.find(|m| m.involves(uid)).await?;
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
}
