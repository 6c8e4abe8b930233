//! Specifier resolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Overrides default specifier resolution. `None` falls back to the default.
pub trait Resolve: Send + Sync {
    fn resolve(&self, specifier: &str, referrer: &Url) -> Option<Url>;
}

/// Absolute specifiers stand for themselves; everything else is relative to the referrer.
pub fn default_resolve(specifier: &str, referrer: &Url) -> Option<Url> {
    match Url::parse(specifier) {
        Ok(url) => Some(url),
        Err(_) => referrer.join(specifier).ok(),
    }
}

/// Import map with exact entries and trailing-slash prefix entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMap {
    /// URL that relative targets are resolved against.
    pub base: Url,
    #[serde(default)]
    pub imports: BTreeMap<String, String>,
}

impl ImportMap {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            imports: BTreeMap::new(),
        }
    }

    pub fn insert(mut self, specifier: impl Into<String>, target: impl Into<String>) -> Self {
        self.imports.insert(specifier.into(), target.into());
        self
    }

    fn target(&self, target: &str) -> Option<Url> {
        default_resolve(target, &self.base)
    }
}

impl Resolve for ImportMap {
    fn resolve(&self, specifier: &str, _referrer: &Url) -> Option<Url> {
        if let Some(target) = self.imports.get(specifier) {
            return self.target(target);
        }

        // Longest matching prefix wins.
        let (prefix, target) = self
            .imports
            .iter()
            .filter(|(key, _)| key.ends_with('/') && specifier.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())?;
        let rest = &specifier[prefix.len()..];
        self.target(&format!("{}{}", target, rest))
    }
}
