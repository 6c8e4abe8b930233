//! Source loading for module analysis.

use crate::error::AnalysisError;
use async_trait::async_trait;
use url::Url;

/// Fetches module source text.
///
/// Returning `Ok(None)` defers to the default loader.
#[async_trait]
pub trait SourceLoad: Send + Sync {
    async fn load(&self, url: &Url) -> Result<Option<String>, AnalysisError>;
}

/// Reads `file:` URLs from disk and fetches `http(s):` URLs.
#[derive(Debug, Clone, Default)]
pub struct DefaultSourceLoader {
    client: reqwest::Client,
}

impl DefaultSourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch(&self, url: &Url) -> Result<String, reqwest::Error> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Whether the default loader can read `url` itself.
pub fn is_loadable(url: &Url) -> bool {
    matches!(url.scheme(), "file" | "http" | "https")
}

#[async_trait]
impl SourceLoad for DefaultSourceLoader {
    async fn load(&self, url: &Url) -> Result<Option<String>, AnalysisError> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| AnalysisError::UnsupportedProtocol(url.to_string()))?;
                let source = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| AnalysisError::Load {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(source))
            }
            "http" | "https" => {
                let source = self.fetch(url).await.map_err(|e| AnalysisError::Load {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(source))
            }
            _ => Err(AnalysisError::UnsupportedProtocol(url.to_string())),
        }
    }
}

/// In-memory sources keyed by URL. Counts reads.
#[derive(Debug, Default)]
pub struct MemorySourceLoader {
    sources: parking_lot::RwLock<std::collections::HashMap<String, String>>,
    reads: std::sync::atomic::AtomicUsize,
}

impl MemorySourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, source: impl Into<String>) {
        self.sources.write().insert(url.into(), source.into());
    }

    /// Number of `load` calls that found a source.
    pub fn reads(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for MemorySourceLoader {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let loader = Self::new();
        for (url, source) in iter {
            loader.insert(url, source);
        }
        loader
    }
}

#[async_trait]
impl SourceLoad for MemorySourceLoader {
    async fn load(&self, url: &Url) -> Result<Option<String>, AnalysisError> {
        let source = self.sources.read().get(url.as_str()).cloned();
        if source.is_some() {
            self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(source)
    }
}
