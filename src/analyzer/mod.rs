//! Module Analyzer
//!
//! Turns a resolved module location into its content hash and its raw static
//! dependency edges. Analysis is memoized per URL for the lifetime of the
//! analyzer, so modules shared by several entrypoints are read and parsed once
//! per build.

pub mod source;
pub mod syntax;

use crate::concurrency::KeyedOnce;
use crate::error::AnalysisError;
use crate::hash::hash_bytes;
use crate::types::ContentHash;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub use source::{is_loadable, DefaultSourceLoader, MemorySourceLoader, SourceLoad};
pub use syntax::{Import, SwcSyntax, SyntaxAnalyzer};

/// Result of analyzing one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub content_hash: ContentHash,
    pub imports: Vec<Import>,
}

pub struct ModuleAnalyzer {
    syntax: Arc<dyn SyntaxAnalyzer>,
    default_loader: DefaultSourceLoader,
    custom_loader: Option<Arc<dyn SourceLoad>>,
    analyzed: KeyedOnce<Url, Arc<Analysis>>,
}

impl Default for ModuleAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleAnalyzer {
    /// Analyzer using swc and the default source loader.
    pub fn new() -> Self {
        Self::with_syntax(Arc::new(SwcSyntax::new()))
    }

    pub fn with_syntax(syntax: Arc<dyn SyntaxAnalyzer>) -> Self {
        Self {
            syntax,
            default_loader: DefaultSourceLoader::new(),
            custom_loader: None,
            analyzed: KeyedOnce::new(),
        }
    }

    /// Consult `loader` before the default one.
    pub fn with_loader(mut self, loader: Arc<dyn SourceLoad>) -> Self {
        self.custom_loader = Some(loader);
        self
    }

    /// Analyze `url`, reusing an earlier result for the same URL.
    pub async fn analyze(&self, url: &Url) -> Result<Arc<Analysis>, AnalysisError> {
        self.analyzed
            .get_or_try_init(url, || async {
                let analysis = self.analyze_uncached(url).await?;
                Ok(Arc::new(analysis))
            })
            .await
    }

    /// Number of distinct modules analyzed so far.
    pub fn analyzed_count(&self) -> usize {
        self.analyzed.len()
    }

    async fn analyze_uncached(&self, url: &Url) -> Result<Analysis, AnalysisError> {
        let source = match self.load(url).await? {
            Some(source) => source,
            None => {
                // External specifier (node:, npm:, ...): identity is the location itself.
                debug!(url = %url, "Treating module as external leaf");
                return Ok(Analysis {
                    content_hash: hash_bytes(url.as_str()),
                    imports: Vec::new(),
                });
            }
        };

        let content_hash = hash_bytes(source.as_bytes());
        let imports = if self.syntax.handles(url) {
            self.syntax.imports(url, &source)?
        } else {
            Vec::new()
        };
        debug!(url = %url, hash = %content_hash.short(), imports = imports.len(), "Analyzed module");
        Ok(Analysis {
            content_hash,
            imports,
        })
    }

    async fn load(&self, url: &Url) -> Result<Option<String>, AnalysisError> {
        if let Some(custom) = &self.custom_loader {
            if let Some(source) = custom.load(url).await? {
                return Ok(Some(source));
            }
        }
        if !is_loadable(url) {
            return Ok(None);
        }
        self.default_loader.load(url).await
    }
}
