use std::sync::Arc;

use kiln::graph::{DependencyGraph, GraphBuilder};
use kiln::persistence::FsPersistence;
use kiln::ModuleAnalyzer;

use crate::support::Site;

fn diamond(site: &Site, d: &str) {
    site.write("pages/a.tsx", "import B from './b.tsx';\nimport { c } from './c.ts';\nexport default B;")
        .write("pages/b.tsx", "export { d } from '../lib/d.ts';\nexport default function B() {}")
        .write("pages/c.ts", "import type { T } from './types.ts';\nimport '../lib/d.ts';\nexport const c = 1;")
        .write("lib/d.ts", d);
}

async fn build(site: &Site) -> DependencyGraph {
    GraphBuilder::new(Arc::new(ModuleAnalyzer::new()))
        .build(&[site.url("pages/a.tsx")])
        .await
        .unwrap()
}

#[tokio::test]
async fn dependency_change_reaches_every_ancestor() {
    let site = Site::new();
    diamond(&site, "export const d = 1;");
    let before = build(&site).await.module_list(site.root());

    diamond(&site, "export const d = 2;");
    let after = build(&site).await.module_list(site.root());

    for name in ["pages/a.tsx", "pages/b.tsx", "pages/c.ts", "lib/d.ts"] {
        assert_ne!(before[name].module_hash, after[name].module_hash, "{}", name);
    }
    assert_eq!(before["pages/a.tsx"].content_hash, after["pages/a.tsx"].content_hash);
    assert_ne!(before["lib/d.ts"].content_hash, after["lib/d.ts"].content_hash);
}

#[tokio::test]
async fn type_only_imports_are_not_edges() {
    let site = Site::new();
    diamond(&site, "export const d = 1;");
    // types.ts does not exist; a type-only import must not be followed.
    let graph = build(&site).await;
    assert_eq!(graph.len(), 4);
}

#[tokio::test]
async fn module_list_is_written_relative_to_root() {
    let site = Site::new();
    diamond(&site, "export const d = 1;");
    let graph = build(&site).await;

    let store = FsPersistence::new(site.root());
    graph
        .write_module_list(&store, "modules.json", site.root(), false)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&site.read("modules.json")).unwrap();
    let entry = &parsed["lib/d.ts"];
    assert!(entry["moduleHash"].is_string());
    assert!(entry["contentHash"].is_string());

    graph
        .write_module_list(&store, "modules.detailed.json", site.root(), true)
        .await
        .unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&site.read("modules.detailed.json")).unwrap();
    let entry = &parsed["pages/b.tsx"];
    assert_eq!(entry["entrypoint"], "pages/a.tsx");
    assert_eq!(entry["dependencies"], serde_json::json!(["lib/d.ts"]));
}

#[tokio::test]
async fn missing_dependency_fails_the_build() {
    let site = Site::new();
    site.write("pages/a.tsx", "import './missing.ts';");
    let result = GraphBuilder::new(Arc::new(ModuleAnalyzer::new()))
        .build(&[site.url("pages/a.tsx")])
        .await;
    assert!(result.is_err());
}
