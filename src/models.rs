use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::ImageUpload;
use crate::storage::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub uid: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: f64,
    pub quantity: u32,
    pub niche: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub save_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn is_liked_by(&self, uid: &str) -> bool {
        self.likes.iter().any(|l| l == uid)
    }
}

impl Document for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub uid: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(post_id: String, uid: String, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id,
            uid,
            text,
            created_at: Utc::now(),
        }
    }
}

impl Document for Comment {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Entry of a user's `saves` subcollection. The id is derived from the pair
/// so a post can be saved at most once per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPost {
    pub id: String,
    pub uid: String,
    pub post_id: String,
    pub saved_at: DateTime<Utc>,
}

impl SavedPost {
    pub fn new(uid: &str, post_id: &str) -> Self {
        Self {
            id: Self::key(uid, post_id),
            uid: uid.to_string(),
            post_id: post_id.to_string(),
            saved_at: Utc::now(),
        }
    }

    pub fn key(uid: &str, post_id: &str) -> String {
        format!("{}_{}", uid, post_id)
    }
}

impl Document for SavedPost {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub uid: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    pub niche: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub quantity: u32,
    #[serde(default = "default_available")]
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

fn default_available() -> bool {
    true
}

impl Trade {
    /// Whether the niche or any keyword tag is in `niches`.
    pub fn in_niches(&self, niches: &[String]) -> bool {
        niches
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&self.niche) || self.tags.iter().any(|t| t.eq_ignore_ascii_case(n)))
    }
}

impl Document for Trade {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One user's interest in another user's trade item, optionally paired with
/// an item of their own. `from_item` stays empty until the proposer offers
/// something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeMatch {
    pub id: String,
    pub from_user: String,
    pub to_user: String,
    #[serde(default)]
    pub from_item: String,
    pub to_item: String,
    pub from_liked: bool,
    pub to_liked: bool,
    pub timestamp: DateTime<Utc>,
}

impl TradeMatch {
    pub fn propose(from_user: &str, to_user: &str, to_item: &str, from_item: Option<&str>) -> Self {
        Self {
            id: Self::key(from_user, to_user, to_item),
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            from_item: from_item.unwrap_or_default().to_string(),
            to_item: to_item.to_string(),
            from_liked: true,
            to_liked: false,
            timestamp: Utc::now(),
        }
    }

    /// Deterministic record id for a proposal. Two proposals by the same user
    /// on the same target item always land on the same record.
    pub fn key(from_user: &str, to_user: &str, to_item: &str) -> String {
        format!("{}__{}__{}", from_user, to_user, to_item)
    }

    pub fn is_mutual(&self) -> bool {
        self.from_liked && self.to_liked
    }

    pub fn involves(&self, uid: &str) -> bool {
        self.from_user == uid || self.to_user == uid
    }
}

impl Document for TradeMatch {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub quantity: u32,
    pub niche: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTradeRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub niche: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub offered_item: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub saved: bool,
    pub save_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradeListResponse {
    pub trades: Vec<Trade>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchListResponse {
    pub matches: Vec<TradeMatch>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentListResponse {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeResponse {
    #[serde(rename = "match")]
    pub trade_match: TradeMatch,
    pub mutual: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chat_id: Option<String>,
}
