//! Error types for the build core.

use std::sync::Arc;
use thiserror::Error;

/// Persistence port errors.
///
/// `NotFound` is expected and drives cold-start fallbacks; everything else is
/// fatal for the operation that hit it.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Malformed response from remote store: {0}")]
    Decode(String),
}

impl PersistenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound(_))
    }
}

/// Module analysis errors. All of them abort the build.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to load {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("Syntax error in {url}: {reason}")]
    Syntax { url: String, reason: String },

    #[error("Unsupported module location: {0}")]
    UnsupportedProtocol(String),
}

/// Dependency graph construction errors.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error(transparent)]
    Analysis(Arc<AnalysisError>),

    #[error("Module {url} loaded with two different loaders: {first:?} and {second:?}")]
    LoaderConflict {
        url: String,
        first: Option<String>,
        second: Option<String>,
    },

    #[error("Cannot resolve {specifier:?} from {referrer}")]
    Unresolvable { specifier: String, referrer: String },

    #[error("Invalid entrypoint: {0}")]
    InvalidEntrypoint(String),
}

impl From<AnalysisError> for GraphError {
    fn from(err: AnalysisError) -> Self {
        GraphError::Analysis(Arc::new(err))
    }
}

/// Generation cache errors.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache persistence failed: {0}")]
    Persistence(Arc<PersistenceError>),

    #[error("Cache serialization failed: {0}")]
    Serialization(String),

    #[error("Cache snapshot missing: {0}")]
    MissingSnapshot(String),

    #[error("Producer for {key} failed: {reason:#}")]
    Producer {
        key: String,
        reason: Arc<anyhow::Error>,
    },
}

impl From<PersistenceError> for CacheError {
    fn from(err: PersistenceError) -> Self {
        CacheError::Persistence(Arc::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Build orchestration errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Loader {name} failed: {reason:#}")]
    Loader { name: String, reason: anyhow::Error },

    #[error("Page {page} failed: {reason}")]
    Page { page: String, reason: String },

    #[error("Build is in state {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for BuildError {
    fn from(err: config::ConfigError) -> Self {
        BuildError::Config(err.to_string())
    }
}

/// Errors surfaced by the CLI, configuration and logging layers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
