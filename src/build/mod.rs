//! Build Orchestrator
//!
//! Drives one build through its states:
//!
//! `Idle -> GraphBuilt -> AssetsGathered -> CacheLoaded -> LoadersRun -> PagesGenerated -> Saved`
//!
//! Each step checks the state it starts from. Every cache is loaded under the
//! configuration identity (the config module graph hash and the crate
//! version), so a change to either starts all caches cold.

pub mod discover;
pub mod loader;
pub mod page;

pub use discover::discover_pages;
pub use loader::{Loader, LoaderContext};
pub use page::{output_path, DynamicPage, LoaderResults, Page, PageDescriptor, Render, StaticPage};

use crate::analyzer::ModuleAnalyzer;
use crate::asset::{assets_for, gather, Asset, AssetMatcher};
use crate::cache::PersistentCache;
use crate::error::{BuildError, CacheError};
use crate::graph::{DependencyGraph, GraphBuilder, Resolve};
use crate::hash::ContentHasher;
use crate::persistence::Persistence;
use crate::types::ContentHash;
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Snapshot path of the page cache.
pub const PAGE_CACHE_PATH: &str = "pages.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOptions {
    pub root: PathBuf,
    pub out_dir: PathBuf,
    /// Module identifying the build configuration. Page entrypoints are excluded from its graph.
    pub config_module: Option<Url>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    GraphBuilt,
    AssetsGathered,
    CacheLoaded,
    LoadersRun,
    PagesGenerated,
    Saved,
}

impl BuildState {
    pub fn name(&self) -> &'static str {
        match self {
            BuildState::Idle => "idle",
            BuildState::GraphBuilt => "graph-built",
            BuildState::AssetsGathered => "assets-gathered",
            BuildState::CacheLoaded => "cache-loaded",
            BuildState::LoadersRun => "loaders-run",
            BuildState::PagesGenerated => "pages-generated",
            BuildState::Saved => "saved",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One written (or reused) page output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageOutput {
    pub entrypoint: String,
    pub route: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub entrypoint: String,
    pub route: String,
    pub error: String,
}

/// Outcome of a build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub config_hash: Option<ContentHash>,
    pub generated: Vec<PageOutput>,
    pub reused: Vec<PageOutput>,
    pub failed: Vec<PageFailure>,
    /// Dynamic page entrypoints, not pre-rendered.
    pub skipped: Vec<String>,
    pub loaders: LoaderResults,
}

pub struct Build {
    options: BuildOptions,
    analyzer: Arc<ModuleAnalyzer>,
    resolver: Option<Arc<dyn Resolve>>,
    persistence: Arc<dyn Persistence>,
    loaders: Vec<Arc<dyn Loader>>,
    pages: Vec<Page>,

    state: BuildState,
    graph: Option<DependencyGraph>,
    config_hash: Option<ContentHash>,
    assets: Vec<Asset>,
    page_cache: Option<PersistentCache<String>>,
    loader_caches: BTreeMap<String, PersistentCache<Value>>,
    report: BuildReport,
}

struct PageJob {
    entrypoint: Url,
    route: String,
    key: String,
    path: PathBuf,
    renderer: Arc<dyn Render>,
    data: Value,
}

impl Build {
    pub fn new(options: BuildOptions, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            options,
            analyzer: Arc::new(ModuleAnalyzer::new()),
            resolver: None,
            persistence,
            loaders: Vec::new(),
            pages: Vec::new(),
            state: BuildState::Idle,
            graph: None,
            config_hash: None,
            assets: Vec::new(),
            page_cache: None,
            loader_caches: BTreeMap::new(),
            report: BuildReport::default(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<ModuleAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register a loader. Loader names must be unique.
    pub fn with_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }

    pub fn config_hash(&self) -> Option<&ContentHash> {
        self.config_hash.as_ref()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn page_cache(&self) -> Option<&PersistentCache<String>> {
        self.page_cache.as_ref()
    }

    pub fn loader_cache(&self, name: &str) -> Option<&PersistentCache<Value>> {
        self.loader_caches.get(name)
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Run every remaining step.
    pub async fn run(&mut self) -> Result<BuildReport, BuildError> {
        self.build_graph().await?;
        self.gather_assets()?;
        self.load_caches().await?;
        self.run_loaders().await?;
        self.generate_pages().await?;
        self.save().await?;
        Ok(self.report.clone())
    }

    fn ensure_state(&self, expected: BuildState) -> Result<(), BuildError> {
        if self.state != expected {
            return Err(BuildError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    fn advance(&mut self, next: BuildState) {
        info!(from = %self.state, to = %next, "Build state");
        self.state = next;
    }

    fn graph_builder(&self, excludes: Vec<Url>) -> GraphBuilder {
        let builder = GraphBuilder::new(self.analyzer.clone()).with_excludes(excludes);
        match &self.resolver {
            Some(resolver) => builder.with_resolver(resolver.clone()),
            None => builder,
        }
    }

    fn identity(&self) -> Result<&str, BuildError> {
        self.config_hash
            .as_ref()
            .map(|h| h.as_str())
            .ok_or(BuildError::InvalidState {
                expected: BuildState::GraphBuilt.name(),
                actual: self.state.name(),
            })
    }

    /// Build the page graph and the configuration identity.
    pub async fn build_graph(&mut self) -> Result<(), BuildError> {
        self.ensure_state(BuildState::Idle)?;

        let entrypoints: Vec<Url> = self.pages.iter().map(|p| p.entrypoint().clone()).collect();
        let graph = self.graph_builder(Vec::new()).build(&entrypoints).await?;

        let mut identity = ContentHasher::new();
        identity.update(env!("CARGO_PKG_VERSION"));
        if let Some(config_module) = &self.options.config_module {
            let config_graph = self
                .graph_builder(entrypoints.clone())
                .build(std::slice::from_ref(config_module))
                .await?;
            identity.fold(config_graph.hash());
        }
        let config_hash = identity.digest();
        debug!(config_hash = %config_hash.short(), "Configuration identity");

        self.report.config_hash = Some(config_hash.clone());
        self.config_hash = Some(config_hash);
        self.graph = Some(graph);
        self.advance(BuildState::GraphBuilt);
        Ok(())
    }

    pub fn gather_assets(&mut self) -> Result<(), BuildError> {
        self.ensure_state(BuildState::GraphBuilt)?;
        if let Some(graph) = &self.graph {
            self.assets = gather(graph, &self.loaders);
        }
        self.advance(BuildState::AssetsGathered);
        Ok(())
    }

    /// Load the page cache and every loader cache under the configuration identity.
    pub async fn load_caches(&mut self) -> Result<(), BuildError> {
        self.ensure_state(BuildState::AssetsGathered)?;
        let hash = self.identity()?.to_string();

        let page_cache =
            PersistentCache::<String>::load(self.persistence.clone(), PAGE_CACHE_PATH, &hash)
                .await?;
        let loader_caches = try_join_all(self.loaders.iter().map(|l| {
            let persistence = self.persistence.clone();
            let hash = hash.as_str();
            async move {
                let cache = PersistentCache::<Value>::load(
                    persistence,
                    loader::cache_path(l.name()),
                    hash,
                )
                .await?;
                Ok::<_, BuildError>((l.name().to_string(), cache))
            }
        }))
        .await?;

        self.page_cache = Some(page_cache);
        self.loader_caches = loader_caches.into_iter().collect();
        self.advance(BuildState::CacheLoaded);
        Ok(())
    }

    /// Run lifecycle hooks around every loader and generate for loaders that claimed assets.
    pub async fn run_loaders(&mut self) -> Result<(), BuildError> {
        self.ensure_state(BuildState::CacheLoaded)?;
        let options = &self.options;
        let assets = &self.assets;
        let caches = &self.loader_caches;

        for l in &self.loaders {
            l.on_build_context_start(options)
                .await
                .map_err(|reason| loader_error(l.as_ref(), reason))?;
        }

        let runs = self.loaders.iter().filter_map(|l| {
            let claimed: Vec<Asset> = assets_for(assets, l.name()).cloned().collect();
            if claimed.is_empty() {
                debug!(loader = l.name(), "No assets, skipping loader");
                return None;
            }
            let cache = caches.get(l.name())?;
            Some(async move {
                let ctx = LoaderContext {
                    cache,
                    assets: &claimed,
                    options,
                };
                let result = l
                    .generate(ctx)
                    .await
                    .map_err(|reason| loader_error(l.as_ref(), reason))?;
                info!(loader = l.name(), assets = claimed.len(), "Loader generated");
                Ok::<_, BuildError>((l.name().to_string(), result))
            })
        });
        let results = try_join_all(runs).await?;

        for l in &self.loaders {
            l.on_build_context_end(options)
                .await
                .map_err(|reason| loader_error(l.as_ref(), reason))?;
        }

        self.report.loaders = results.into_iter().collect();
        self.advance(BuildState::LoadersRun);
        Ok(())
    }

    /// Render every static page path whose key is neither hot nor cold.
    ///
    /// A failed render is recorded in the report and left out of the cache.
    pub async fn generate_pages(&mut self) -> Result<(), BuildError> {
        self.ensure_state(BuildState::LoadersRun)?;
        let graph = self.graph.as_ref().ok_or(BuildError::InvalidState {
            expected: BuildState::GraphBuilt.name(),
            actual: self.state.name(),
        })?;
        let cache = self.page_cache.as_ref().ok_or(BuildError::InvalidState {
            expected: BuildState::CacheLoaded.name(),
            actual: self.state.name(),
        })?;

        let mut jobs = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        for page in &self.pages {
            let page = match page {
                Page::Static(page) => page,
                Page::Dynamic(page) => {
                    debug!(page = %page.entrypoint, "Dynamic page, not pre-rendered");
                    skipped.push(page.entrypoint.to_string());
                    continue;
                }
            };
            let module_hash = graph
                .root(&page.entrypoint)
                .map(|m| m.module_hash.clone())
                .ok_or_else(|| BuildError::Page {
                    page: page.entrypoint.to_string(),
                    reason: "entrypoint missing from graph".to_string(),
                })?;

            for data in &page.paths {
                let route = page.renderer.route(data);
                match page_job(page, &module_hash, data, route.clone(), &self.options) {
                    Ok(job) => jobs.push(job),
                    Err(e) => failed.push(PageFailure {
                        entrypoint: page.entrypoint.to_string(),
                        route,
                        error: e.to_string(),
                    }),
                }
            }
        }

        let results = Arc::new(self.report.loaders.clone());
        let outcomes = join_all(jobs.into_iter().map(|job| {
            let results = results.clone();
            async move {
                let PageJob {
                    entrypoint,
                    route,
                    key,
                    path,
                    renderer,
                    data,
                } = job;
                let reused = AtomicBool::new(false);
                let producer = move || async move {
                    let html = renderer.render(&data, &results).await?;
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&path, html).await?;
                    Ok::<_, anyhow::Error>(path.to_string_lossy().into_owned())
                };

                // A remembered output that is gone from disk is rendered again.
                let missing = match cache.get(&key) {
                    Some(previous) => !tokio::fs::try_exists(&previous).await.unwrap_or(false),
                    None => false,
                };
                let result = if missing {
                    debug!(page = %entrypoint, route = %route, "Cached output missing, regenerating");
                    match producer().await {
                        Ok(path) => {
                            cache.set(key.clone(), path.clone());
                            Ok(path)
                        }
                        Err(e) => Err(CacheError::Producer {
                            key,
                            reason: Arc::new(e),
                        }),
                    }
                } else {
                    cache
                        .memoize_with(&key, producer, || reused.store(true, Ordering::SeqCst))
                        .await
                };
                (entrypoint, route, reused.into_inner(), result)
            }
        }))
        .await;

        let mut generated = Vec::new();
        let mut reused_outputs = Vec::new();
        for (entrypoint, route, reused, result) in outcomes {
            match result {
                Ok(path) => {
                    let output = PageOutput {
                        entrypoint: entrypoint.to_string(),
                        route,
                        path,
                    };
                    if reused {
                        reused_outputs.push(output);
                    } else {
                        generated.push(output);
                    }
                }
                Err(e) => {
                    warn!(page = %entrypoint, route = %route, error = %e, "Page generation failed");
                    failed.push(PageFailure {
                        entrypoint: entrypoint.to_string(),
                        route,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            generated = generated.len(),
            reused = reused_outputs.len(),
            failed = failed.len(),
            "Pages generated"
        );
        self.report.generated = generated;
        self.report.reused = reused_outputs;
        self.report.failed = failed;
        self.report.skipped = skipped;
        self.advance(BuildState::PagesGenerated);
        Ok(())
    }

    /// Persist the page cache and every loader cache. Any write failure is fatal.
    pub async fn save(&mut self) -> Result<(), BuildError> {
        self.ensure_state(BuildState::PagesGenerated)?;
        if let Some(cache) = &self.page_cache {
            cache.save().await?;
        }
        for cache in self.loader_caches.values() {
            cache.save().await?;
        }
        self.advance(BuildState::Saved);
        Ok(())
    }
}

fn loader_error(l: &dyn Loader, reason: anyhow::Error) -> BuildError {
    BuildError::Loader {
        name: l.name().to_string(),
        reason,
    }
}

/// Page memo key: the page identity (entrypoint and route), the page module
/// hash and the serialized input.
pub fn page_key(
    entrypoint: &Url,
    route: &str,
    module_hash: &ContentHash,
    data: &Value,
) -> Result<String, BuildError> {
    let serialized = serde_json::to_string(data).map_err(|e| BuildError::Page {
        page: entrypoint.to_string(),
        reason: e.to_string(),
    })?;
    let mut hasher = ContentHasher::new();
    hasher
        .update(entrypoint.as_str())
        .update(route)
        .update(module_hash.as_str())
        .update(serialized);
    Ok(hasher.digest().to_string())
}

fn page_job(
    page: &StaticPage,
    module_hash: &ContentHash,
    data: &Value,
    route: String,
    options: &BuildOptions,
) -> Result<PageJob, BuildError> {
    Ok(PageJob {
        entrypoint: page.entrypoint.clone(),
        key: page_key(&page.entrypoint, &route, module_hash, data)?,
        path: output_path(&options.out_dir, &route)?,
        route,
        renderer: page.renderer.clone(),
        data: data.clone(),
    })
}
