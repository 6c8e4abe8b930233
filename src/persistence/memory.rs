//! In-memory backend, used for dry runs and tests.

use super::Persistence;
use crate::error::PersistenceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn set(&self, path: &str, content: &str) -> Result<(), PersistenceError> {
        self.entries
            .write()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<String, PersistenceError> {
        self.entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), PersistenceError> {
        self.entries.write().remove(path);
        Ok(())
    }
}
