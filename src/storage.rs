use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, RwLockWriteGuard};

use crate::chat_models::{Chat, Message};
use crate::models::{Comment, Post, SavedPost, Trade, TradeMatch};
use crate::user_models::{Account, User};

/// Anything that lives in a collection and is addressed by id.
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// A named set of JSON documents, optionally mirrored to `<dir>/<name>.json`.
///
/// Writes build the next state on a copy and only swap it in once it is on
/// disk, so a failed save leaves the collection as it was. Every successful
/// write publishes on the collection's change feed so that live queries can
/// re-read their snapshot.
pub struct Collection<T> {
    name: &'static str,
    docs: RwLock<Vec<T>>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<()>,
}

impl<T: Document> Collection<T> {
    pub fn open(name: &'static str, data_dir: Option<&Path>) -> Result<Self> {
        let path = data_dir.map(|dir| dir.join(format!("{}.json", name)));

        let docs = match &path {
            Some(p) if p.exists() => {
                let data = fs::read_to_string(p)
                    .with_context(|| format!("Failed to read {} collection", name))?;
                serde_json::from_str(&data)
                    .with_context(|| format!("Failed to parse {} collection", name))?
            }
            _ => Vec::new(),
        };

        let (changes, _rx) = broadcast::channel(64);

        Ok(Self {
            name,
            docs: RwLock::new(docs),
            path,
            changes,
        })
    }

    pub fn in_memory(name: &'static str) -> Self {
        let (changes, _rx) = broadcast::channel(64);
        Self {
            name,
            docs: RwLock::new(Vec::new()),
            path: None,
            changes,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn insert(&self, doc: T) -> Result<T> {
        let mut docs = self.docs.write().await;
        let mut next = docs.clone();
        next.push(doc.clone());
        self.commit(&mut docs, next)?;
        Ok(doc)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|d| d.id() == id).cloned())
    }

    pub async fn all(&self) -> Result<Vec<T>> {
        let docs = self.docs.read().await;
        Ok(docs.clone())
    }

    pub async fn find<F>(&self, filter: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let docs = self.docs.read().await;
        Ok(docs.iter().filter(|d| filter(d)).cloned().collect())
    }

    pub async fn find_one<F>(&self, filter: F) -> Result<Option<T>>
    where
        F: Fn(&T) -> bool,
    {
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|d| filter(d)).cloned())
    }

    /// Applies `mutate` to the document with `id` and returns the new value.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut T),
    {
        let mut docs = self.docs.write().await;

        let Some(index) = docs.iter().position(|d| d.id() == id) else {
            return Ok(None);
        };
        let mut next = docs.clone();
        mutate(&mut next[index]);
        let updated = next[index].clone();

        self.commit(&mut docs, next)?;
        Ok(Some(updated))
    }

    pub async fn remove(&self, id: &str) -> Result<Option<T>> {
        let mut docs = self.docs.write().await;

        let Some(index) = docs.iter().position(|d| d.id() == id) else {
            return Ok(None);
        };

        let mut next = docs.clone();
        let removed = next.remove(index);
        self.commit(&mut docs, next)?;
        Ok(Some(removed))
    }

    /// Holds the write guard for a compound read-then-write. Nothing else can
    /// read or write the collection until the returned guard is committed or
    /// dropped. Changes made through the guard are discarded unless
    /// `commit` succeeds.
    pub async fn lock(&self) -> CollectionGuard<'_, T> {
        let docs = self.docs.write().await;
        CollectionGuard {
            collection: self,
            working: docs.clone(),
            docs,
        }
    }

    /// Opens a live query. The first `next()` yields the current snapshot,
    /// later calls wait for a change and yield the fresh snapshot.
    pub fn subscribe<F>(self: &Arc<Self>, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Subscription {
            collection: Arc::clone(self),
            filter: Box::new(filter),
            changes: self.changes.subscribe(),
            dirty: true,
        }
    }

    /// Persists `next`, then makes it the live state.
    fn commit(&self, docs: &mut Vec<T>, next: Vec<T>) -> Result<()> {
        self.save_to_disk(&next)?;
        *docs = next;
        // No receivers just means no live queries are open.
        let _ = self.changes.send(());
        Ok(())
    }

    fn save_to_disk(&self, docs: &[T]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(docs)
            .with_context(|| format!("Failed to serialize {} collection", self.name))?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write {} collection", self.name))?;
        Ok(())
    }
}

pub struct CollectionGuard<'a, T: Document> {
    collection: &'a Collection<T>,
    docs: RwLockWriteGuard<'a, Vec<T>>,
    working: Vec<T>,
}

impl<'a, T: Document> CollectionGuard<'a, T> {
    pub fn find_mut<F>(&mut self, filter: F) -> Option<&mut T>
    where
        F: Fn(&T) -> bool,
    {
        self.working.iter_mut().find(|d| filter(d))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.working.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.working.iter()
    }

    pub fn push(&mut self, doc: T) {
        self.working.push(doc);
    }

    pub fn commit(self) -> Result<()> {
        let CollectionGuard {
            collection,
            mut docs,
            working,
        } = self;
        collection.commit(&mut docs, working)
    }
}

pub struct Subscription<T> {
    collection: Arc<Collection<T>>,
    filter: Box<dyn Fn(&T) -> bool + Send + Sync>,
    changes: broadcast::Receiver<()>,
    /// A snapshot is owed. Cleared only once one has been read, so a `next()`
    /// dropped mid-read (e.g. losing a `select!`) re-reads on the next call.
    dirty: bool,
}

impl<T: Document> Subscription<T> {
    /// Returns `None` once the collection's change feed is closed.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        if !self.dirty {
            match self.changes.recv().await {
                Ok(()) => {}
                // Snapshots are full reads, so a skipped notification loses nothing.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        collection = self.collection.name(),
                        skipped,
                        "Live query lagged, re-reading snapshot"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
            self.dirty = true;
        }

        let snapshot = {
            let docs = self.collection.docs.read().await;
            docs.iter().filter(|d| (self.filter)(d)).cloned().collect()
        };
        self.dirty = false;
        Some(snapshot)
    }
}

/// Every collection the service persists.
pub struct Store {
    pub users: Arc<Collection<User>>,
    pub accounts: Arc<Collection<Account>>,
    pub posts: Arc<Collection<Post>>,
    pub comments: Arc<Collection<Comment>>,
    pub saves: Arc<Collection<SavedPost>>,
    pub trades: Arc<Collection<Trade>>,
    pub trade_matches: Arc<Collection<TradeMatch>>,
    pub chats: Arc<Collection<Chat>>,
    pub messages: Arc<Collection<Message>>,
}

impl Store {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;
        let dir = Some(data_dir);

        Ok(Self {
            users: Arc::new(Collection::open("users", dir)?),
            accounts: Arc::new(Collection::open("accounts", dir)?),
            posts: Arc::new(Collection::open("posts", dir)?),
            comments: Arc::new(Collection::open("comments", dir)?),
            saves: Arc::new(Collection::open("saves", dir)?),
            trades: Arc::new(Collection::open("trades", dir)?),
            trade_matches: Arc::new(Collection::open("tradeMatches", dir)?),
            chats: Arc::new(Collection::open("chats", dir)?),
            messages: Arc::new(Collection::open("messages", dir)?),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(Collection::in_memory("users")),
            accounts: Arc::new(Collection::in_memory("accounts")),
            posts: Arc::new(Collection::in_memory("posts")),
            comments: Arc::new(Collection::in_memory("comments")),
            saves: Arc::new(Collection::in_memory("saves")),
            trades: Arc::new(Collection::in_memory("trades")),
            trade_matches: Arc::new(Collection::in_memory("tradeMatches")),
            chats: Arc::new(Collection::in_memory("chats")),
            messages: Arc::new(Collection::in_memory("messages")),
        }
    }
}
