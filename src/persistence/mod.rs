//! Persistence port
//!
//! Storage for cache snapshots and module lists. The cache only needs three
//! path-addressed operations; backends decide what a path means.

pub mod fs;
pub mod kv;
pub mod memory;

use crate::error::PersistenceError;
use async_trait::async_trait;

pub use fs::FsPersistence;
pub use kv::KvPersistence;
pub use memory::MemoryPersistence;

/// Path-addressed text storage.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Write `content` at `path`, replacing anything already there.
    async fn set(&self, path: &str, content: &str) -> Result<(), PersistenceError>;

    /// Read the content at `path`. Fails with [`PersistenceError::NotFound`] if absent.
    async fn get(&self, path: &str) -> Result<String, PersistenceError>;

    /// Remove `path`. Removing an absent path succeeds.
    async fn delete(&self, path: &str) -> Result<(), PersistenceError>;
}
