use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kiln::build::{LoaderContext, LoaderResults, Render, StaticPage};
use kiln::hash::ContentHasher;
use kiln::persistence::FsPersistence;
use kiln::{AssetMatcher, Build, BuildOptions, BuildReport, Loader, Page};
use serde_json::{json, Value};
use url::Url;

use crate::support::Site;

/// Concatenates claimed stylesheets into one hashed bundle.
struct StyleBundler {
    bundles: AtomicUsize,
}

impl AssetMatcher for StyleBundler {
    fn name(&self) -> &str {
        "style"
    }

    fn test(&self, url: &Url) -> bool {
        url.path().ends_with(".css")
    }
}

#[async_trait]
impl Loader for StyleBundler {
    async fn generate(&self, ctx: LoaderContext<'_>) -> anyhow::Result<Value> {
        let mut key = ContentHasher::new();
        for asset in ctx.assets {
            key.fold(&asset.content_hash);
        }
        let key = key.digest();

        let assets = ctx.assets.to_vec();
        let out_dir = ctx.options.out_dir.clone();
        let name = format!("{}.css", key.short());
        let href = ctx
            .cache
            .memoize(key.as_str(), move || async move {
                let mut bundle = String::new();
                for asset in &assets {
                    let path = asset
                        .url
                        .to_file_path()
                        .map_err(|_| anyhow::anyhow!("not a file: {}", asset.url))?;
                    bundle.push_str(&tokio::fs::read_to_string(path).await?);
                }
                tokio::fs::create_dir_all(out_dir.join("assets")).await?;
                tokio::fs::write(out_dir.join("assets").join(&name), bundle).await?;
                Ok::<_, anyhow::Error>(json!(format!("/assets/{}", name)))
            })
            .await?;
        self.bundles.fetch_add(1, Ordering::SeqCst);
        Ok(href)
    }
}

struct Article {
    renders: AtomicUsize,
}

#[async_trait]
impl Render for Article {
    fn route(&self, data: &Value) -> String {
        format!("posts/{}", data["slug"].as_str().unwrap_or("untitled"))
    }

    async fn render(&self, data: &Value, loaders: &LoaderResults) -> anyhow::Result<String> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "<link rel=stylesheet href={}><h1>{}</h1>",
            loaders.get("style").cloned().unwrap_or(Value::Null),
            data["title"].as_str().unwrap_or_default()
        ))
    }
}

fn scaffold(site: &Site) {
    site.write(
        "pages/post.tsx",
        "import Nav from '../components/nav.tsx';\nimport './post.css';\nexport default Nav;",
    )
    .write(
        "components/nav.tsx",
        "import './nav.css';\nexport default function Nav() { return null; }",
    )
    .write("components/nav.css", "nav { display: flex; }")
    .write("pages/post.css", "h1 { color: red; }")
    .write("kiln.config.ts", "export default { minify: false };");
}

struct Harness {
    site: Site,
    article: Arc<Article>,
    bundler: Arc<StyleBundler>,
}

impl Harness {
    fn new() -> Self {
        let site = Site::new();
        scaffold(&site);
        Self {
            site,
            article: Arc::new(Article {
                renders: AtomicUsize::new(0),
            }),
            bundler: Arc::new(StyleBundler {
                bundles: AtomicUsize::new(0),
            }),
        }
    }

    async fn run(&self, paths: Vec<Value>) -> BuildReport {
        let options = BuildOptions {
            root: self.site.root().to_path_buf(),
            out_dir: self.site.root().join("dist"),
            config_module: Some(self.site.url("kiln.config.ts")),
        };
        let persistence = Arc::new(FsPersistence::new(self.site.root().join(".cache")));
        let mut build = Build::new(options, persistence)
            .with_loader(self.bundler.clone())
            .with_page(Page::Static(StaticPage {
                entrypoint: self.site.url("pages/post.tsx"),
                paths,
                renderer: self.article.clone(),
            }));
        build.run().await.unwrap()
    }

    fn renders(&self) -> usize {
        self.article.renders.load(Ordering::SeqCst)
    }
}

fn posts() -> Vec<Value> {
    vec![
        json!({"slug": "hello", "title": "Hello"}),
        json!({"slug": "world", "title": "World"}),
    ]
}

#[tokio::test]
async fn first_build_generates_everything() {
    let harness = Harness::new();
    let report = harness.run(posts()).await;

    assert_eq!(report.generated.len(), 2);
    assert!(report.failed.is_empty());
    let href = report.loaders["style"].as_str().unwrap().to_string();
    assert!(href.starts_with("/assets/"));

    let html = harness.site.read("dist/posts/hello/index.html");
    assert!(html.contains(&href));
    assert!(html.contains("<h1>Hello</h1>"));

    let bundle = harness.site.read(&format!("dist{}", href));
    assert!(bundle.contains("nav { display: flex; }"));
    assert!(bundle.contains("h1 { color: red; }"));
}

#[tokio::test]
async fn unchanged_rebuild_reuses_every_page() {
    let harness = Harness::new();
    harness.run(posts()).await;
    let report = harness.run(posts()).await;

    assert!(report.generated.is_empty());
    assert_eq!(report.reused.len(), 2);
    assert_eq!(harness.renders(), 2);
    assert!(report.reused[0].path.ends_with("index.html"));
}

#[tokio::test]
async fn nested_dependency_change_regenerates_pages() {
    let harness = Harness::new();
    let first = harness.run(posts()).await;

    harness
        .site
        .write("components/nav.css", "nav { display: grid; }");
    let second = harness.run(posts()).await;

    assert_eq!(second.generated.len(), 2);
    assert_eq!(harness.renders(), 4);
    assert_ne!(first.loaders["style"], second.loaders["style"]);
    assert_eq!(first.config_hash, second.config_hash);
}

#[tokio::test]
async fn config_module_change_starts_cold() {
    let harness = Harness::new();
    let first = harness.run(posts()).await;

    harness
        .site
        .write("kiln.config.ts", "export default { minify: true };");
    let second = harness.run(posts()).await;

    assert_ne!(first.config_hash, second.config_hash);
    assert_eq!(second.generated.len(), 2);
    assert!(second.reused.is_empty());
}

#[tokio::test]
async fn only_new_inputs_are_rendered() {
    let harness = Harness::new();
    harness.run(posts()).await;

    let mut paths = posts();
    paths.push(json!({"slug": "again", "title": "Again"}));
    let report = harness.run(paths).await;

    assert_eq!(report.reused.len(), 2);
    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.generated[0].route, "posts/again");
    assert_eq!(harness.renders(), 3);
}
