//! CLI Tooling
//!
//! Command-line interface over the build core. Every command is scoped to a
//! workspace and returns its output as a string (text table or JSON).

use crate::analyzer::ModuleAnalyzer;
use crate::asset::{gather, Asset, ExtensionMatcher};
use crate::build::{discover_pages, PAGE_CACHE_PATH};
use crate::cache::CacheSnapshot;
use crate::config::{file_url, ConfigLoader, KilnConfig};
use crate::error::ApiError;
use crate::graph::{relative_name, DependencyGraph, GraphBuilder};
use crate::logging::{LogFormat, LogOutput};
use crate::persistence::{FsPersistence, Persistence};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Kiln CLI - incremental static page builds
#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Content-hashed dependency graphs and generation caches for static pages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<LogOutput>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply logging flags on top of the configured logging section.
    pub fn apply_log_overrides(&self, config: &mut KilnConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(output) = self.log_output {
            config.logging.output = output;
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the dependency graph and list its modules
    Graph {
        /// Entrypoint files (default: discovered pages)
        entrypoints: Vec<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Write the module list file
    Modules {
        /// Entrypoint files (default: discovered pages)
        entrypoints: Vec<PathBuf>,
        /// Output path, relative to the workspace
        #[arg(long, default_value = "modules.json")]
        output: String,
        /// Include entrypoint, URL and dependencies for each module
        #[arg(long)]
        detailed: bool,
    },
    /// Gather assets for extension-based loaders
    Assets {
        /// Loader definitions as name=ext[,ext...] (default: style=css and script=js,jsx,ts,tsx)
        #[arg(long = "loader")]
        loaders: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the resolved configuration as TOML
    Config,
    /// Inspect or clear persisted cache snapshots
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show a snapshot's identity and entries
    Inspect {
        /// Snapshot path within the cache store
        #[arg(long, default_value = PAGE_CACHE_PATH)]
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete a snapshot so the next build starts cold
    Clear {
        /// Snapshot path within the cache store
        #[arg(long, default_value = PAGE_CACHE_PATH)]
        path: String,
    },
}

/// CLI context for executing commands
pub struct CliContext {
    workspace_root: PathBuf,
    config: KilnConfig,
    persistence: Arc<dyn Persistence>,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Self::with_config(workspace_root, config)
    }

    pub fn with_config(workspace_root: PathBuf, config: KilnConfig) -> Result<Self, ApiError> {
        let workspace_root = dunce::canonicalize(&workspace_root).map_err(|e| {
            ApiError::ConfigError(format!(
                "Workspace {} is not accessible: {}",
                workspace_root.display(),
                e
            ))
        })?;
        let persistence = config.cache.persistence(&workspace_root)?;
        Ok(Self {
            workspace_root,
            config,
            persistence,
        })
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Graph {
                entrypoints,
                format,
            } => {
                let graph = self.build_graph(entrypoints).await?;
                self.format_graph(&graph, format)
            }
            Commands::Modules {
                entrypoints,
                output,
                detailed,
            } => {
                let graph = self.build_graph(entrypoints).await?;
                let store = FsPersistence::new(self.workspace_root.clone());
                graph
                    .write_module_list(&store, output, &self.workspace_root, *detailed)
                    .await?;
                info!(path = %output, modules = graph.len(), "Wrote module list");
                Ok(format!("Wrote {} modules to {}", graph.len(), output))
            }
            Commands::Assets { loaders, format } => {
                let matchers = parse_matchers(loaders)?;
                let graph = self.build_graph(&[]).await?;
                let assets = gather(&graph, &matchers);
                self.format_assets(&assets, format)
            }
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| ApiError::ConfigError(e.to_string())),
            Commands::Cache { command } => match command {
                CacheCommands::Inspect { path, format } => self.inspect_cache(path, format).await,
                CacheCommands::Clear { path } => {
                    self.persistence.delete(path).await?;
                    info!(path = %path, "Cleared cache snapshot");
                    Ok(format!("Cleared {}", path))
                }
            },
        }
    }

    fn entrypoint_urls(&self, explicit: &[PathBuf]) -> Result<Vec<Url>, ApiError> {
        if explicit.is_empty() {
            let pages = self.config.build.pages_path(&self.workspace_root);
            return Ok(discover_pages(&pages, &self.config.build.extensions)?);
        }
        explicit
            .iter()
            .map(|path| file_url(&self.workspace_root.join(path)))
            .collect()
    }

    async fn build_graph(&self, explicit: &[PathBuf]) -> Result<DependencyGraph, ApiError> {
        let entrypoints = self.entrypoint_urls(explicit)?;
        if entrypoints.is_empty() {
            return Err(ApiError::InvalidArgument("No entrypoints found".to_string()));
        }
        let mut builder = GraphBuilder::new(Arc::new(ModuleAnalyzer::new()));
        if let Some(map) = self.config.import_map(&self.workspace_root)? {
            builder = builder.with_resolver(Arc::new(map));
        }
        Ok(builder.build(&entrypoints).await?)
    }

    fn format_graph(&self, graph: &DependencyGraph, format: &str) -> Result<String, ApiError> {
        if format == "json" {
            return to_json(&graph.module_list_detailed(&self.workspace_root));
        }
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Entrypoint", "Module", "Content", "Module Hash", "Deps"]);
        for module in graph.modules() {
            table.add_row(vec![
                relative_name(&module.entrypoint, &self.workspace_root),
                relative_name(&module.url, &self.workspace_root),
                module.content_hash.short().to_string(),
                module.module_hash.short().to_string(),
                module.dependencies.len().to_string(),
            ]);
        }
        Ok(format!("{}\nGraph hash: {}", table, graph.hash()))
    }

    fn format_assets(&self, assets: &[Asset], format: &str) -> Result<String, ApiError> {
        if format == "json" {
            return to_json(&assets);
        }
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Loader", "Entrypoint", "Module", "Module Hash"]);
        for asset in assets {
            table.add_row(vec![
                asset.loader.clone(),
                relative_name(&asset.entrypoint, &self.workspace_root),
                relative_name(&asset.url, &self.workspace_root),
                asset.module_hash.short().to_string(),
            ]);
        }
        Ok(table.to_string())
    }

    async fn inspect_cache(&self, path: &str, format: &str) -> Result<String, ApiError> {
        let content = self.persistence.get(path).await?;
        let snapshot: CacheSnapshot<Value> = serde_json::from_str(&content)
            .map_err(|e| ApiError::InvalidArgument(format!("{} is not a cache snapshot: {}", path, e)))?;
        if format == "json" {
            return to_json(&snapshot);
        }
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Key", "Value"]);
        for (key, value) in &snapshot.data {
            table.add_row(vec![key.clone(), value.to_string()]);
        }
        Ok(format!(
            "Snapshot: {}\nIdentity: {}\nEntries: {}\n{}",
            path,
            snapshot.hash,
            snapshot.data.len(),
            table
        ))
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(|e| ApiError::InvalidArgument(e.to_string()))
}

/// Parse `name=ext,ext` loader definitions.
pub fn parse_matchers(definitions: &[String]) -> Result<Vec<ExtensionMatcher>, ApiError> {
    if definitions.is_empty() {
        return Ok(vec![
            ExtensionMatcher::new("style", ["css"]),
            ExtensionMatcher::new("script", ["js", "jsx", "ts", "tsx"]),
        ]);
    }
    definitions
        .iter()
        .map(|definition| {
            let (name, extensions) = definition.split_once('=').ok_or_else(|| {
                ApiError::InvalidArgument(format!("Expected name=ext[,ext...], got {:?}", definition))
            })?;
            let extensions: Vec<&str> = extensions
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .collect();
            if name.trim().is_empty() || extensions.is_empty() {
                return Err(ApiError::InvalidArgument(format!(
                    "Loader definition {:?} needs a name and at least one extension",
                    definition
                )));
            }
            Ok(ExtensionMatcher::new(name.trim(), extensions))
        })
        .collect()
}
