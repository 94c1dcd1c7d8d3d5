use crate::error::{ApiError, ApiResult, AuthErrorCode};
use crate::media::{ImageUpload, MediaStore, ObjectPath};
use crate::models::{Post, SavedPost};
use crate::storage::Store;
use crate::user_models::{UpdateProfileRequest, User};
use crate::validation;

pub async fn get_profile(store: &Store, uid: &str) -> ApiResult<User> {
    store
        .users
        .get(uid)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub async fn find_by_username(store: &Store, username: &str) -> ApiResult<User> {
    store
        .users
        .find_one(|u| u.username.eq_ignore_ascii_case(username))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No user named '{}'", username)))
}

pub async fn update_profile(store: &Store, uid: &str, req: UpdateProfileRequest) -> ApiResult<User> {
    if let Some(name) = &req.display_name {
        validation::require("Display name", name)?;
    }
    let username = match &req.username {
        Some(name) => {
            let name = name.trim().to_string();
            validation::check_username(&name)?;
            Some(name)
        }
        None => None,
    };
    let interests = req.interests.as_deref().map(validation::normalize_tags);

    let mut users = store.users.lock().await;

    if let Some(name) = &username {
        let taken = users
            .iter()
            .any(|u| u.id != uid && u.username.eq_ignore_ascii_case(name));
        if taken {
            return Err(ApiError::Auth(AuthErrorCode::UsernameTaken));
        }
    }

    let user = users
        .find_mut(|u| u.id == uid)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if let Some(name) = req.display_name {
        user.display_name = name.trim().to_string();
    }
    if let Some(name) = username {
        user.username = name;
    }
    if let Some(country) = req.country {
        user.country = Some(country.trim().to_string()).filter(|c| !c.is_empty());
    }
    if let Some(language) = req.language {
        user.language = Some(language.trim().to_string()).filter(|l| !l.is_empty());
    }
    if let Some(interests) = interests {
        user.interests = interests;
    }

    let updated = user.clone();
    users.commit()?;
    Ok(updated)
}

/// Uploads to `avatars/{uid}.jpg` and points the profile at it.
pub async fn set_avatar(store: &Store, media: &MediaStore, uid: &str, image: &ImageUpload) -> ApiResult<User> {
    let stored = media
        .upload(ObjectPath::Avatar { uid: uid.to_string() }, image)
        .await?;

    // Bust client caches, the path never changes.
    let url = format!("{}?v={}", stored.url, chrono::Utc::now().timestamp_millis());

    match store.users.update(uid, |u| u.avatar_url = Some(url)).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            media.discard(std::slice::from_ref(&stored)).await;
            Err(ApiError::NotFound("User not found".to_string()))
        }
        Err(e) => {
            media.discard(std::slice::from_ref(&stored)).await;
            Err(e.into())
        }
    }
}

/// Toggles the post in the caller's saves. Returns the new saved state and
/// the post's save count.
pub async fn toggle_save(store: &Store, uid: &str, post_id: &str) -> ApiResult<(bool, u32)> {
    if store.posts.get(post_id).await?.is_none() {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }

    let key = SavedPost::key(uid, post_id);
    let saved = if store.saves.remove(&key).await?.is_some() {
        false
    } else {
        store.saves.insert(SavedPost::new(uid, post_id)).await?;
        true
    };

    let post = store
        .posts
        .update(post_id, |p| {
            p.save_count = if saved {
                p.save_count + 1
            } else {
                p.save_count.saturating_sub(1)
            };
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    Ok((saved, post.save_count))
}

/// Saved posts, most recently saved first. Saves of deleted posts are skipped.
pub async fn saved_posts(store: &Store, uid: &str) -> ApiResult<Vec<Post>> {
    let mut saves = store.saves.find(|s| s.uid == uid).await?;
    saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));

    let mut posts = Vec::with_capacity(saves.len());
    for save in saves {
        if let Some(post) = store.posts.get(&save.post_id).await? {
            posts.push(post);
        }
    }
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(store: &Store) {
        let mut ana = User::new("u1".to_string(), "ana".to_string(), "Ana".to_string());
        ana.interests = vec!["eco".to_string()];
        store.users.insert(ana).await.unwrap();
        store
            .users
            .insert(User::new("u2".to_string(), "bo".to_string(), "Bo".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_interests_and_username() {
        let store = Store::in_memory();
        seed(&store).await;

        let updated = update_profile(
            &store,
            "u1",
            UpdateProfileRequest {
                username: Some("ana_2".to_string()),
                interests: Some(vec!["Art".to_string(), "art".to_string(), "Eco".to_string()]),
                country: Some("PT".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.username, "ana_2");
        assert_eq!(updated.interests, vec!["art", "eco"]);
        assert_eq!(find_by_username(&store, "ANA_2").await.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn username_collision() {
        let store = Store::in_memory();
        seed(&store).await;

        let err = update_profile(
            &store,
            "u1",
            UpdateProfileRequest {
                username: Some("Bo".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "username-taken");
    }
}
