//! Posts: listing with filter/sort/pagination, creation, likes and comments.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::media::{MediaStore, ObjectPath, StoredObject};
use crate::models::{Comment, CreatePostRequest, Post, PostPage};
use crate::storage::Store;
use crate::validation;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;
pub const MAX_POST_IMAGES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    Popular,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub niche: Option<String>,
    pub tag: Option<String>,
    #[serde(alias = "q")]
    pub search: Option<String>,
    pub owner: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    #[serde(default)]
    pub sort: SortOrder,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl FeedQuery {
    fn matches(&self, post: &Post, search: Option<&str>) -> bool {
        if let Some(niche) = &self.niche {
            if !post.niche.eq_ignore_ascii_case(niche) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !post.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if &post.uid != owner {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| post.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| post.price > max) {
            return false;
        }
        if let Some(needle) = search {
            let hit = post.title.to_lowercase().contains(needle)
                || post.description.to_lowercase().contains(needle);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Filters and sorts in memory, then cuts the requested page.
pub fn apply_query(posts: Vec<Post>, query: &FeedQuery) -> PostPage {
    let search = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut hits: Vec<Post> = posts
        .into_iter()
        .filter(|p| query.matches(p, search.as_deref()))
        .collect();

    match query.sort {
        SortOrder::Newest => hits.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => hits.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::PriceAsc => hits.sort_by(|a, b| a.price.total_cmp(&b.price)),
        SortOrder::PriceDesc => hits.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortOrder::Popular => hits.sort_by(|a, b| {
            b.likes
                .len()
                .cmp(&a.likes.len())
                .then(b.created_at.cmp(&a.created_at))
        }),
    }

    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let total = hits.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);

    PostPage {
        posts: hits.drain(start..end).collect(),
        page,
        page_size,
        total,
        has_more: end < total,
    }
}

pub async fn list_posts(store: &Store, query: &FeedQuery) -> ApiResult<PostPage> {
    let posts = store.posts.all().await?;
    Ok(apply_query(posts, query))
}

pub async fn get_post(store: &Store, post_id: &str) -> ApiResult<Post> {
    store
        .posts
        .get(post_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

pub async fn create_post(store: &Store, media: &MediaStore, uid: &str, req: CreatePostRequest) -> ApiResult<Post> {
    validation::require("Title", &req.title)?;
    validation::require("Niche", &req.niche)?;
    if !req.price.is_finite() || req.price < 0.0 {
        return Err(ApiError::Validation("Price must be zero or more".to_string()));
    }
    if req.quantity == 0 {
        return Err(ApiError::Validation("Quantity must be at least 1".to_string()));
    }
    if req.images.len() > MAX_POST_IMAGES {
        return Err(ApiError::Validation(format!(
            "A post can have at most {} images",
            MAX_POST_IMAGES
        )));
    }
    // Reject bad images before anything is written.
    for image in &req.images {
        MediaStore::decode(image)?;
    }

    let mut uploaded: Vec<StoredObject> = Vec::with_capacity(req.images.len());
    for image in &req.images {
        match media.upload(ObjectPath::PostImage, image).await {
            Ok(stored) => uploaded.push(stored),
            Err(e) => {
                media.discard(&uploaded).await;
                return Err(e);
            }
        }
    }

    let post = Post {
        id: Uuid::new_v4().to_string(),
        uid: uid.to_string(),
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        images: uploaded.iter().map(|o| o.url.clone()).collect(),
        price: req.price,
        quantity: req.quantity,
        niche: req.niche.trim().to_lowercase(),
        tags: validation::normalize_tags(&req.tags),
        likes: Vec::new(),
        save_count: 0,
        created_at: Utc::now(),
    };

    match store.posts.insert(post).await {
        Ok(post) => {
            tracing::info!(post_id = %post.id, uid = %uid, "Post created");
            Ok(post)
        }
        Err(e) => {
            media.discard(&uploaded).await;
            Err(e.into())
        }
    }
}

pub async fn delete_post(store: &Store, uid: &str, post_id: &str) -> ApiResult<()> {
    let post = get_post(store, post_id).await?;
    if post.uid != uid {
        return Err(ApiError::Forbidden("You can only delete your own posts".to_string()));
    }
    store.posts.remove(post_id).await?;
    Ok(())
}

/// Flips the caller's like on a post.
pub async fn toggle_like(store: &Store, uid: &str, post_id: &str) -> ApiResult<(bool, usize)> {
    let post = store
        .posts
        .update(post_id, |p| {
            if p.is_liked_by(uid) {
                p.likes.retain(|l| l != uid);
            } else {
                p.likes.push(uid.to_string());
            }
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    Ok((post.is_liked_by(uid), post.likes.len()))
}

pub async fn add_comment(store: &Store, uid: &str, post_id: &str, text: &str) -> ApiResult<Comment> {
    validation::require("Comment", text)?;
    get_post(store, post_id).await?;

    let comment = Comment::new(post_id.to_string(), uid.to_string(), text.trim().to_string());
    Ok(store.comments.insert(comment).await?)
}

pub async fn list_comments(store: &Store, post_id: &str) -> ApiResult<Vec<Comment>> {
    let mut comments = store.comments.find(|c| c.post_id == post_id).await?;
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn post(id: &str, price: f64, niche: &str, likes: usize, age_minutes: i64) -> Post {
        Post {
            id: id.to_string(),
            uid: "owner".to_string(),
            title: format!("Item {}", id),
            description: "hand made".to_string(),
            images: Vec::new(),
            price,
            quantity: 1,
            niche: niche.to_string(),
            tags: vec!["vintage".to_string()],
            likes: (0..likes).map(|i| format!("u{}", i)).collect(),
            save_count: 0,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn ids(page: &PostPage) -> Vec<&str> {
        page.posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn filters_by_niche_and_price() {
        let posts = vec![
            post("a", 10.0, "eco", 0, 3),
            post("b", 50.0, "eco", 0, 2),
            post("c", 20.0, "art", 0, 1),
        ];
        let query = FeedQuery {
            niche: Some("ECO".to_string()),
            max_price: Some(20.0),
            ..Default::default()
        };
        assert_eq!(ids(&apply_query(posts, &query)), vec!["a"]);
    }

    #[test]
    fn sorts() {
        let posts = vec![
            post("a", 30.0, "eco", 1, 3),
            post("b", 10.0, "eco", 5, 2),
            post("c", 20.0, "eco", 0, 1),
        ];

        let newest = apply_query(posts.clone(), &FeedQuery::default());
        assert_eq!(ids(&newest), vec!["c", "b", "a"]);

        let cheap = apply_query(
            posts.clone(),
            &FeedQuery {
                sort: SortOrder::PriceAsc,
                ..Default::default()
            },
        );
        assert_eq!(ids(&cheap), vec!["b", "c", "a"]);

        let popular = apply_query(
            posts,
            &FeedQuery {
                sort: SortOrder::Popular,
                ..Default::default()
            },
        );
        assert_eq!(ids(&popular), vec!["b", "a", "c"]);
    }

    #[test]
    fn paginates() {
        let posts: Vec<Post> = (0..5).map(|i| post(&i.to_string(), 1.0, "eco", 0, i)).collect();
        let query = FeedQuery {
            page: Some(2),
            page_size: Some(2),
            ..Default::default()
        };
        let page = apply_query(posts.clone(), &query);
        assert_eq!(ids(&page), vec!["2", "3"]);
        assert!(page.has_more);
        assert_eq!(page.total, 5);

        let past_end = apply_query(
            posts,
            &FeedQuery {
                page: Some(9),
                page_size: Some(2),
                ..Default::default()
            },
        );
        assert!(past_end.posts.is_empty());
        assert!(!past_end.has_more);
    }

    #[test]
    fn search_matches_title_or_description() {
        let posts = vec![post("a", 1.0, "eco", 0, 1), post("b", 1.0, "eco", 0, 2)];
        let query = FeedQuery {
            search: Some("  ITEM B ".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&apply_query(posts, &query)), vec!["b"]);
    }

    #[tokio::test]
    async fn like_toggles() {
        let store = Store::in_memory();
        store.posts.insert(post("a", 1.0, "eco", 0, 1)).await.unwrap();

        assert_eq!(toggle_like(&store, "me", "a").await.unwrap(), (true, 1));
        assert_eq!(toggle_like(&store, "me", "a").await.unwrap(), (false, 0));
        assert!(toggle_like(&store, "me", "missing").await.is_err());
    }
}
