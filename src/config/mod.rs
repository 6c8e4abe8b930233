//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, the global file under
//! `$XDG_CONFIG_HOME/kiln/config.toml`, the workspace `kiln.toml`, then
//! `KILN__SECTION__KEY` environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;
pub mod workspace;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use workspace::storage_paths::{CacheBackend, CacheConfig};

use crate::error::ApiError;
use crate::graph::ImportMap;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_extensions() -> Vec<String> {
    ["tsx", "jsx", "ts", "js"].iter().map(|s| s.to_string()).collect()
}

/// Build layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Page entrypoints directory (relative to workspace root)
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,

    /// Generated output directory (relative to workspace root)
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Module whose graph identifies the build configuration
    #[serde(default)]
    pub config_module: Option<PathBuf>,

    /// File extensions treated as pages
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pages_dir: default_pages_dir(),
            out_dir: default_out_dir(),
            config_module: None,
            extensions: default_extensions(),
        }
    }
}

impl BuildConfig {
    pub fn pages_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.pages_dir)
    }

    pub fn out_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.out_dir)
    }

    pub fn config_module_url(&self, workspace_root: &Path) -> Result<Option<Url>, ApiError> {
        self.config_module
            .as_ref()
            .map(|module| file_url(&workspace_root.join(module)))
            .transpose()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Bare specifier -> target, resolved against the workspace root
    #[serde(default)]
    pub import_map: BTreeMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KilnConfig {
    /// Import map rooted at the workspace, if any entries are configured.
    pub fn import_map(&self, workspace_root: &Path) -> Result<Option<ImportMap>, ApiError> {
        if self.import_map.is_empty() {
            return Ok(None);
        }
        let base = Url::from_directory_path(absolute(workspace_root)).map_err(|_| {
            ApiError::ConfigError(format!(
                "Workspace root is not an absolute path: {}",
                workspace_root.display()
            ))
        })?;
        let map = self
            .import_map
            .iter()
            .fold(ImportMap::new(base), |map, (specifier, target)| {
                map.insert(specifier.clone(), target.clone())
            });
        Ok(Some(map))
    }
}

/// `file:` URL for a filesystem path.
pub fn file_url(path: &Path) -> Result<Url, ApiError> {
    Url::from_file_path(absolute(path)).map_err(|_| {
        ApiError::ConfigError(format!("Path is not absolute: {}", path.display()))
    })
}

fn absolute(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}
