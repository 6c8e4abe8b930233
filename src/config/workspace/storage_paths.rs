//! CacheConfig and snapshot storage resolution for a workspace.

use crate::config::xdg;
use crate::error::ApiError;
use crate::persistence::{FsPersistence, KvPersistence, Persistence};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".kiln/cache")
}

/// Snapshot storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Fs,
    Kv,
}

/// Cache storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Snapshot directory for the fs backend (relative to workspace root)
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Endpoint of the key-value store
    #[serde(default)]
    pub kv_url: Option<String>,

    /// Bearer token; prefer `kv_token_env`
    #[serde(default)]
    pub kv_token: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default)]
    pub kv_token_env: Option<String>,

    /// Key prefix inside the store
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Fs,
            dir: default_cache_dir(),
            kv_url: None,
            kv_token: None,
            kv_token_env: None,
            namespace: None,
        }
    }
}

impl CacheConfig {
    /// Resolve the snapshot directory.
    ///
    /// The default location lives under the XDG data directory for the
    /// workspace; anything else is relative to the workspace root.
    pub fn resolve_dir(&self, workspace_root: &Path) -> Result<PathBuf, ApiError> {
        if self.dir == default_cache_dir() {
            Ok(xdg::workspace_data_dir(workspace_root)?.join("cache"))
        } else {
            Ok(workspace_root.join(&self.dir))
        }
    }

    fn token(&self) -> Result<String, ApiError> {
        if let Some(var) = &self.kv_token_env {
            return std::env::var(var).map_err(|_| {
                ApiError::ConfigError(format!("Environment variable {} is not set", var))
            });
        }
        self.kv_token.clone().ok_or_else(|| {
            ApiError::ConfigError("cache.kv_token or cache.kv_token_env is required".to_string())
        })
    }

    /// Build the configured persistence backend.
    pub fn persistence(&self, workspace_root: &Path) -> Result<Arc<dyn Persistence>, ApiError> {
        match self.backend {
            CacheBackend::Fs => Ok(Arc::new(FsPersistence::new(self.resolve_dir(workspace_root)?))),
            CacheBackend::Kv => {
                let url = self.kv_url.clone().ok_or_else(|| {
                    ApiError::ConfigError("cache.kv_url is required for the kv backend".to_string())
                })?;
                let mut kv = KvPersistence::new(url, self.token()?);
                if let Some(namespace) = &self.namespace {
                    kv = kv.with_namespace(namespace.clone());
                }
                Ok(Arc::new(kv))
            }
        }
    }
}
