//! Asset gathering.
//!
//! Walks every entrypoint graph and hands each reachable module to the
//! registered matchers. All matching loaders claim a module; a module whose
//! import edge declared a loader goes to that loader only.

use crate::graph::DependencyGraph;
use crate::types::{ContentHash, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A module claimed by a loader for one entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub loader: String,
    pub entrypoint: Url,
    pub url: Url,
    pub module: ModuleId,
    pub module_hash: ContentHash,
    pub content_hash: ContentHash,
}

/// Claims modules by URL.
pub trait AssetMatcher: Send + Sync {
    fn name(&self) -> &str;

    fn test(&self, url: &Url) -> bool;
}

impl<T: AssetMatcher + ?Sized> AssetMatcher for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn test(&self, url: &Url) -> bool {
        (**self).test(url)
    }
}

impl<T: AssetMatcher + ?Sized> AssetMatcher for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn test(&self, url: &Url) -> bool {
        (**self).test(url)
    }
}

/// Matches modules by file extension.
#[derive(Debug, Clone)]
pub struct ExtensionMatcher {
    name: String,
    extensions: Vec<String>,
}

impl ExtensionMatcher {
    pub fn new<I, S>(name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl AssetMatcher for ExtensionMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, url: &Url) -> bool {
        url.path()
            .rsplit_once('.')
            .map(|(_, ext)| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Collect assets in traversal order.
///
/// Each entrypoint is walked depth-first in import order, root excluded.
/// Output is stable for a given graph and matcher list.
pub fn gather<M: AssetMatcher>(graph: &DependencyGraph, matchers: &[M]) -> Vec<Asset> {
    let mut assets = Vec::new();
    let mut claimed: HashSet<(String, Url, Url)> = HashSet::new();

    for &root in graph.roots() {
        let mut visited: HashSet<ModuleId> = HashSet::new();
        visited.insert(root);
        let mut stack: Vec<ModuleId> = graph.module(root).dependencies.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let module = graph.module(id);

            for matcher in matchers {
                let matches = match &module.loader {
                    Some(declared) => declared == matcher.name(),
                    None => matcher.test(&module.url),
                };
                if !matches {
                    continue;
                }
                let key = (
                    matcher.name().to_string(),
                    module.entrypoint.clone(),
                    module.url.clone(),
                );
                if claimed.insert(key) {
                    assets.push(Asset {
                        loader: matcher.name().to_string(),
                        entrypoint: module.entrypoint.clone(),
                        url: module.url.clone(),
                        module: module.id,
                        module_hash: module.module_hash.clone(),
                        content_hash: module.content_hash.clone(),
                    });
                }
            }

            stack.extend(module.dependencies.iter().rev().copied());
        }
    }

    debug!(assets = assets.len(), "Gathered assets");
    assets
}

/// Assets claimed by `loader`, in gather order.
pub fn assets_for<'a>(assets: &'a [Asset], loader: &'a str) -> impl Iterator<Item = &'a Asset> {
    assets.iter().filter(move |a| a.loader == loader)
}
