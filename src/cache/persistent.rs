//! Persistent cache
//!
//! Wraps a [`Cache`] with the persistence port it was loaded from. Loading
//! treats a missing or foreign snapshot as a cold start; saving is fatal on
//! any write failure.

use super::Cache;
use crate::error::CacheError;
use crate::persistence::Persistence;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PersistentCache<V> {
    cache: Cache<V>,
    persistence: Arc<dyn Persistence>,
    path: String,
}

impl<V> PersistentCache<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Start empty without reading the previous snapshot.
    pub fn create(persistence: Arc<dyn Persistence>, path: impl Into<String>, hash: &str) -> Self {
        Self {
            cache: Cache::new(hash),
            persistence,
            path: path.into(),
        }
    }

    /// Load the previous snapshot at `path` as the cold generation.
    ///
    /// A missing snapshot, an unreadable one, or one written under another
    /// configuration identity yields an empty previous generation.
    pub async fn load(
        persistence: Arc<dyn Persistence>,
        path: impl Into<String>,
        hash: &str,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        let cache = match persistence.get(&path).await {
            Ok(content) => match Cache::unserialize(&content, Some(hash)) {
                Ok(cache) => cache,
                Err(e) => {
                    warn!(path = %path, error = %e, "Unreadable cache snapshot, starting cold");
                    Cache::new(hash)
                }
            },
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "No cache snapshot, starting cold");
                Cache::new(hash)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            cache,
            persistence,
            path,
        })
    }

    /// Like [`PersistentCache::load`], but a missing snapshot is an error.
    pub async fn require(
        persistence: Arc<dyn Persistence>,
        path: impl Into<String>,
        hash: &str,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        let content = persistence.get(&path).await.map_err(|e| {
            if e.is_not_found() {
                CacheError::MissingSnapshot(path.clone())
            } else {
                e.into()
            }
        })?;
        Ok(Self {
            cache: Cache::unserialize(&content, Some(hash))?,
            persistence,
            path,
        })
    }

    /// Write the current generation.
    pub async fn save(&self) -> Result<(), CacheError> {
        let content = self.cache.serialize()?;
        self.persistence.set(&self.path, &content).await?;
        info!(path = %self.path, entries = self.cache.len(), "Saved cache snapshot");
        Ok(())
    }

    /// Remove the persisted snapshot.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.persistence.delete(&self.path).await?;
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cache(&self) -> &Cache<V> {
        &self.cache
    }
}

impl<V> Deref for PersistentCache<V> {
    type Target = Cache<V>;

    fn deref(&self) -> &Cache<V> {
        &self.cache
    }
}
