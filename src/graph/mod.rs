//! Dependency Graph
//!
//! One graph per build, one root module per entrypoint. Modules live in an
//! arena owned by the graph and refer to their dependencies by [`ModuleId`],
//! so a module reached through several import paths of the same entrypoint
//! is a single node. Entrypoints never share nodes, even for the same URL.

pub mod builder;
pub mod resolve;

use crate::error::PersistenceError;
use crate::persistence::Persistence;
use crate::types::{ContentHash, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

pub use builder::GraphBuilder;
pub use resolve::{default_resolve, ImportMap, Resolve};

/// Graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub entrypoint: Url,
    pub url: Url,
    /// Loader declared on the import edge that introduced this module.
    pub loader: Option<String>,
    /// Hash of the module's own source.
    pub content_hash: ContentHash,
    /// Content hash folded with the module hash of every dependency, in discovery order.
    pub module_hash: ContentHash,
    pub dependencies: Vec<ModuleId>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    modules: Vec<Module>,
    roots: Vec<ModuleId>,
    hash: ContentHash,
}

/// Entry of the module list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub module_hash: ContentHash,
    pub content_hash: ContentHash,
}

/// Entry of the detailed module list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedModuleRecord {
    pub module_hash: ContentHash,
    pub content_hash: ContentHash,
    pub entrypoint: String,
    pub url: String,
    pub dependencies: Vec<String>,
}

impl DependencyGraph {
    pub(crate) fn new(modules: Vec<Module>, roots: Vec<ModuleId>, hash: ContentHash) -> Self {
        Self {
            modules,
            roots,
            hash,
        }
    }

    /// Fold of every root module hash, in entrypoint order.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    pub fn roots(&self) -> &[ModuleId] {
        &self.roots
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Root module of `entrypoint`.
    pub fn root(&self, entrypoint: &Url) -> Option<&Module> {
        self.roots
            .iter()
            .map(|id| self.module(*id))
            .find(|m| &m.url == entrypoint)
    }

    /// Node for `url` inside the graph of `entrypoint`.
    pub fn find(&self, entrypoint: &Url, url: &Url) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| &m.entrypoint == entrypoint && &m.url == url)
    }

    pub fn dependencies(&self, id: ModuleId) -> impl Iterator<Item = &Module> {
        self.module(id).dependencies.iter().map(|dep| self.module(*dep))
    }

    /// `relative path -> { moduleHash, contentHash }`.
    pub fn module_list(&self, root: &Path) -> BTreeMap<String, ModuleRecord> {
        let mut list = BTreeMap::new();
        for module in &self.modules {
            list.entry(relative_name(&module.url, root))
                .or_insert_with(|| ModuleRecord {
                    module_hash: module.module_hash.clone(),
                    content_hash: module.content_hash.clone(),
                });
        }
        list
    }

    /// Module list that also records entrypoint, URL and dependency paths.
    pub fn module_list_detailed(&self, root: &Path) -> BTreeMap<String, DetailedModuleRecord> {
        let mut list = BTreeMap::new();
        for module in &self.modules {
            list.entry(relative_name(&module.url, root))
                .or_insert_with(|| DetailedModuleRecord {
                    module_hash: module.module_hash.clone(),
                    content_hash: module.content_hash.clone(),
                    entrypoint: relative_name(&module.entrypoint, root),
                    url: module.url.to_string(),
                    dependencies: self
                        .dependencies(module.id)
                        .map(|dep| relative_name(&dep.url, root))
                        .collect(),
                });
        }
        list
    }

    /// Persist the module list as pretty JSON.
    pub async fn write_module_list(
        &self,
        persistence: &dyn Persistence,
        path: &str,
        root: &Path,
        detailed: bool,
    ) -> Result<(), PersistenceError> {
        let content = if detailed {
            serde_json::to_string_pretty(&self.module_list_detailed(root))
        } else {
            serde_json::to_string_pretty(&self.module_list(root))
        }
        .map_err(|e| PersistenceError::Decode(e.to_string()))?;
        persistence.set(path, &content).await
    }
}

/// Path of a `file:` URL relative to `root` with `/` separators; other URLs verbatim.
pub fn relative_name(url: &Url, root: &Path) -> String {
    url.to_file_path()
        .ok()
        .and_then(|path| {
            path.strip_prefix(root).ok().map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
        })
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_name() {
        let root = Path::new("/site");
        let url = Url::parse("file:///site/pages/index.tsx").unwrap();
        assert_eq!(relative_name(&url, root), "pages/index.tsx");

        let outside = Url::parse("file:///elsewhere/a.ts").unwrap();
        assert_eq!(relative_name(&outside, root), "file:///elsewhere/a.ts");

        let remote = Url::parse("https://esm.sh/preact").unwrap();
        assert_eq!(relative_name(&remote, root), "https://esm.sh/preact");
    }
}
