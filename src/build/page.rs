//! Page descriptors.
//!
//! Pages are either static (pre-rendered once per input in their path list)
//! or dynamic (rendered on request, skipped by the build). Descriptors coming
//! from configuration are validated into a [`Page`] once.

use crate::error::BuildError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Loader results keyed by loader name.
pub type LoaderResults = BTreeMap<String, Value>;

/// Renders one static page.
#[async_trait]
pub trait Render: Send + Sync {
    /// Output route for one entry of the path list, e.g. `blog/hello`.
    fn route(&self, data: &Value) -> String;

    async fn render(&self, data: &Value, loaders: &LoaderResults) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct StaticPage {
    pub entrypoint: Url,
    /// Input data, one output per entry.
    pub paths: Vec<Value>,
    pub renderer: Arc<dyn Render>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicPage {
    pub entrypoint: Url,
    pub route: String,
}

#[derive(Clone)]
pub enum Page {
    Static(StaticPage),
    Dynamic(DynamicPage),
}

impl Page {
    pub fn entrypoint(&self) -> &Url {
        match self {
            Page::Static(page) => &page.entrypoint,
            Page::Dynamic(page) => &page.entrypoint,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Page::Static(_))
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Page::Static(page) => f
                .debug_struct("Static")
                .field("entrypoint", &page.entrypoint.as_str())
                .field("paths", &page.paths.len())
                .finish(),
            Page::Dynamic(page) => f
                .debug_struct("Dynamic")
                .field("entrypoint", &page.entrypoint.as_str())
                .field("route", &page.route)
                .finish(),
        }
    }
}

/// Serialized page declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageDescriptor {
    Static {
        entrypoint: String,
        #[serde(default)]
        paths: Vec<Value>,
    },
    Dynamic {
        entrypoint: String,
        route: String,
    },
}

impl PageDescriptor {
    pub fn from_json(content: &str) -> Result<Self, BuildError> {
        serde_json::from_str(content).map_err(|e| BuildError::Page {
            page: "<descriptor>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn entrypoint(&self) -> &str {
        match self {
            PageDescriptor::Static { entrypoint, .. } | PageDescriptor::Dynamic { entrypoint, .. } => {
                entrypoint
            }
        }
    }

    /// Validate into a [`Page`]. Entrypoints are resolved against `base`.
    ///
    /// Static pages need a renderer. An empty path list renders once with `{}`.
    pub fn into_page(self, base: &Url, renderer: Option<Arc<dyn Render>>) -> Result<Page, BuildError> {
        let entrypoint = base.join(self.entrypoint()).map_err(|e| BuildError::Page {
            page: self.entrypoint().to_string(),
            reason: e.to_string(),
        })?;
        match self {
            PageDescriptor::Static { paths, .. } => {
                let renderer = renderer.ok_or_else(|| BuildError::Page {
                    page: entrypoint.to_string(),
                    reason: "static page has no renderer".to_string(),
                })?;
                let paths = if paths.is_empty() {
                    vec![Value::Object(Default::default())]
                } else {
                    paths
                };
                Ok(Page::Static(StaticPage {
                    entrypoint,
                    paths,
                    renderer,
                }))
            }
            PageDescriptor::Dynamic { route, .. } => {
                Ok(Page::Dynamic(DynamicPage { entrypoint, route }))
            }
        }
    }
}

/// `<out_dir>/<route>/index.html`. Routes may not leave `out_dir`.
pub fn output_path(out_dir: &Path, route: &str) -> Result<PathBuf, BuildError> {
    let relative = Path::new(route.trim_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(BuildError::Page {
            page: route.to_string(),
            reason: "route escapes the output directory".to_string(),
        });
    }
    Ok(out_dir.join(relative).join("index.html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Render for Echo {
        fn route(&self, data: &Value) -> String {
            data["slug"].as_str().unwrap_or_default().to_string()
        }

        async fn render(&self, data: &Value, _loaders: &LoaderResults) -> anyhow::Result<String> {
            Ok(data.to_string())
        }
    }

    fn base() -> Url {
        Url::parse("file:///site/").unwrap()
    }

    #[test]
    fn test_descriptor_tagging() {
        let desc = PageDescriptor::from_json(
            r#"{"type": "static", "entrypoint": "pages/blog.tsx", "paths": [{"slug": "a"}]}"#,
        )
        .unwrap();
        let page = desc.into_page(&base(), Some(Arc::new(Echo))).unwrap();
        assert!(page.is_static());
        assert_eq!(page.entrypoint().as_str(), "file:///site/pages/blog.tsx");

        let desc = PageDescriptor::from_json(
            r#"{"type": "dynamic", "entrypoint": "pages/api.ts", "route": "/api"}"#,
        )
        .unwrap();
        assert!(!desc.into_page(&base(), None).unwrap().is_static());
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(PageDescriptor::from_json(r#"{"entrypoint": "pages/a.tsx"}"#).is_err());
        assert!(PageDescriptor::from_json(r#"{"type": "dynamic", "entrypoint": "a.ts"}"#).is_err());

        let desc = PageDescriptor::Static {
            entrypoint: "pages/a.tsx".to_string(),
            paths: vec![],
        };
        assert!(desc.clone().into_page(&base(), None).is_err());
        match desc.into_page(&base(), Some(Arc::new(Echo))).unwrap() {
            Page::Static(page) => assert_eq!(page.paths, vec![json!({})]),
            other => panic!("unexpected page: {:?}", other),
        }
    }

    #[test]
    fn test_output_path() {
        let out = Path::new("/site/dist");
        assert_eq!(
            output_path(out, "/blog/hello/").unwrap(),
            PathBuf::from("/site/dist/blog/hello/index.html")
        );
        assert_eq!(output_path(out, "").unwrap(), PathBuf::from("/site/dist/index.html"));
        assert!(output_path(out, "../etc").is_err());
    }
}
