//! Object storage for uploaded images, served back under `/media`.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// An image as it arrives in a JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUpload {
    pub filename: String,
    /// Base64 (standard alphabet) file contents.
    pub data: String,
}

/// Where an object lives inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectPath {
    PostImage,
    TradeImage,
    ChatImage { chat_id: String },
    Avatar { uid: String },
}

impl ObjectPath {
    fn resolve(&self, extension: &str) -> String {
        match self {
            ObjectPath::PostImage => format!("post-images/{}.{}", Uuid::new_v4(), extension),
            ObjectPath::TradeImage => format!("trade-images/{}.{}", Uuid::new_v4(), extension),
            ObjectPath::ChatImage { chat_id } => {
                format!("chat-images/{}/{}.{}", chat_id, Uuid::new_v4(), extension)
            }
            ObjectPath::Avatar { uid } => format!("avatars/{}.jpg", uid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
}

pub struct MediaStore {
    root: PathBuf,
    public_base: String,
}

impl MediaStore {
    pub fn new(root: PathBuf, public_url: &str) -> Self {
        Self {
            root,
            public_base: format!("{}/media", public_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decodes and checks an upload without writing anything.
    pub fn decode(upload: &ImageUpload) -> ApiResult<(Vec<u8>, String)> {
        let extension = Path::new(&upload.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ApiError::Validation(format!(
                "Unsupported image type '.{}'. Use jpg, png, gif or webp",
                extension
            )));
        }

        let bytes = STANDARD
            .decode(upload.data.trim())
            .map_err(|_| ApiError::Validation("Image data is not valid base64".to_string()))?;

        if bytes.is_empty() {
            return Err(ApiError::Validation("Image is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::Validation("Image is larger than 5 MB".to_string()));
        }

        Ok((bytes, extension))
    }

    /// Upload-then-get-URL.
    pub async fn upload(&self, target: ObjectPath, upload: &ImageUpload) -> ApiResult<StoredObject> {
        let (bytes, extension) = Self::decode(upload)?;
        let path = target.resolve(&extension);
        let full = self.root.join(&path);

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create media directory")?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path))?;

        tracing::debug!(path = %path, "Stored upload");

        Ok(StoredObject {
            url: format!("{}/{}", self.public_base, path),
            path,
        })
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.root.join(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path)),
        }
    }

    /// Removes objects whose document write failed. Errors are logged only,
    /// the caller is already failing.
    pub async fn discard(&self, objects: &[StoredObject]) {
        for object in objects {
            if let Err(e) = self.delete(&object.path).await {
                tracing::warn!(path = %object.path, error = %e, "Failed to remove orphaned upload");
            }
        }
    }
}
