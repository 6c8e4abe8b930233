//! Asset loader plugins.

use super::BuildOptions;
use crate::asset::{Asset, AssetMatcher};
use crate::cache::PersistentCache;
use async_trait::async_trait;
use serde_json::Value;

/// What a loader sees while generating.
pub struct LoaderContext<'a> {
    /// The loader's private cache, loaded under the build's configuration identity.
    pub cache: &'a PersistentCache<Value>,
    pub assets: &'a [Asset],
    pub options: &'a BuildOptions,
}

/// Claims modules through [`AssetMatcher`] and turns them into a build artifact.
///
/// Only invoked when at least one asset was gathered for it.
#[async_trait]
pub trait Loader: AssetMatcher {
    async fn generate(&self, ctx: LoaderContext<'_>) -> anyhow::Result<Value>;

    async fn on_build_context_start(&self, _options: &BuildOptions) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_build_context_end(&self, _options: &BuildOptions) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Snapshot path of a loader's private cache.
pub fn cache_path(loader: &str) -> String {
    format!("loaders/{}.json", loader)
}
