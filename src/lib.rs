//! Kiln: Incremental Static Page Builds
//!
//! Content-hashed module dependency graphs feeding a two-generation
//! generation cache, so a build regenerates only the pages and assets whose
//! module hash or input data changed since the last build.

pub mod analyzer;
pub mod asset;
pub mod build;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod graph;
pub mod hash;
pub mod logging;
pub mod persistence;
pub mod tooling;
pub mod types;

pub use analyzer::{Analysis, ModuleAnalyzer};
pub use asset::{gather, Asset, AssetMatcher};
pub use build::{Build, BuildOptions, BuildReport, BuildState, Loader, Page};
pub use cache::{Cache, PersistentCache};
pub use error::{AnalysisError, ApiError, BuildError, CacheError, GraphError, PersistenceError};
pub use graph::{DependencyGraph, GraphBuilder, Module};
pub use hash::ContentHasher;
pub use persistence::Persistence;
pub use types::{ContentHash, ModuleId};
