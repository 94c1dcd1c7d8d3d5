use anyhow::Result;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::media::MediaStore;
use crate::storage::Store;

/// Shared by every handler.
pub struct AppState {
    pub store: Arc<Store>,
    pub media: MediaStore,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(store: Arc<Store>, media: MediaStore, bcrypt_cost: u32) -> Self {
        Self {
            auth: AuthService::new(Arc::clone(&store), bcrypt_cost),
            store,
            media,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config.data_dir)?);
        let media = MediaStore::new(config.media_dir(), &config.public_url);
        Ok(Self::new(store, media, config.bcrypt_cost))
    }
}
