//! Local filesystem backend.

use super::Persistence;
use crate::error::PersistenceError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores each path as a file below `root`.
#[derive(Debug, Clone)]
pub struct FsPersistence {
    root: PathBuf,
}

impl FsPersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    if source.kind() == ErrorKind::NotFound {
        PersistenceError::NotFound(path.display().to_string())
    } else {
        PersistenceError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// `<name>.tmp` next to `target`; the full file name is kept so `a.json`
/// and `a.html` never share a staging file.
fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

#[async_trait]
impl Persistence for FsPersistence {
    async fn set(&self, path: &str, content: &str) -> Result<(), PersistenceError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
        }
        // Write through a sibling temp file so readers never see a partial snapshot.
        let staging = staging_path(&target);
        tokio::fs::write(&staging, content)
            .await
            .map_err(|e| io_error(&staging, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| io_error(&target, e))
    }

    async fn get(&self, path: &str) -> Result<String, PersistenceError> {
        let target = self.resolve(path);
        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| io_error(&target, e))
    }

    async fn delete(&self, path: &str) -> Result<(), PersistenceError> {
        let target = self.resolve(path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&target, e)),
        }
    }
}
