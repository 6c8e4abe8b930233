//! Graph construction.
//!
//! Each entrypoint is traversed independently with an explicit stack. A module
//! is pushed once per entrypoint; revisits attach the existing node to the new
//! parent. Hash finalization is deferred to a second step pushed beneath the
//! module's children, so every dependency finalized before its parent.

use super::resolve::{default_resolve, Resolve};
use super::{DependencyGraph, Module};
use crate::analyzer::ModuleAnalyzer;
use crate::error::GraphError;
use crate::hash::ContentHasher;
use crate::types::{ContentHash, ModuleId};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

pub struct GraphBuilder {
    analyzer: Arc<ModuleAnalyzer>,
    resolver: Option<Arc<dyn Resolve>>,
    excludes: HashSet<Url>,
}

enum Step {
    Visit {
        url: Url,
        loader: Option<String>,
        parent: Option<usize>,
    },
    Finalize(usize),
}

/// Node under construction, local to one entrypoint.
struct Pending {
    url: Url,
    loader: Option<String>,
    content_hash: ContentHash,
    module_hash: Option<ContentHash>,
    dependencies: Vec<usize>,
}

impl GraphBuilder {
    pub fn new(analyzer: Arc<ModuleAnalyzer>) -> Self {
        Self {
            analyzer,
            resolver: None,
            excludes: HashSet::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// URLs never traversed. Edges to them are dropped.
    pub fn with_excludes(mut self, excludes: impl IntoIterator<Item = Url>) -> Self {
        self.excludes.extend(excludes);
        self
    }

    pub fn analyzer(&self) -> &Arc<ModuleAnalyzer> {
        &self.analyzer
    }

    /// Build one graph rooted at each entrypoint, in entrypoint order.
    pub async fn build(&self, entrypoints: &[Url]) -> Result<DependencyGraph, GraphError> {
        let partials = try_join_all(entrypoints.iter().map(|e| self.traverse(e))).await?;

        let mut modules: Vec<Module> = Vec::new();
        let mut roots = Vec::with_capacity(partials.len());
        let mut hasher = ContentHasher::new();
        for (entrypoint, partial) in entrypoints.iter().zip(partials) {
            let offset = modules.len();
            roots.push(ModuleId(offset));
            for (local, node) in partial.into_iter().enumerate() {
                let module_hash = node.module_hash.unwrap_or_else(|| node.content_hash.clone());
                if local == 0 {
                    hasher.fold(&module_hash);
                }
                modules.push(Module {
                    id: ModuleId(offset + local),
                    entrypoint: entrypoint.clone(),
                    url: node.url,
                    loader: node.loader,
                    content_hash: node.content_hash,
                    module_hash,
                    dependencies: node
                        .dependencies
                        .into_iter()
                        .map(|dep| ModuleId(offset + dep))
                        .collect(),
                });
            }
        }

        let graph = DependencyGraph::new(modules, roots, hasher.digest());
        info!(
            entrypoints = entrypoints.len(),
            modules = graph.len(),
            hash = %graph.hash().short(),
            "Built dependency graph"
        );
        Ok(graph)
    }

    fn resolve(&self, specifier: &str, referrer: &Url) -> Result<Url, GraphError> {
        self.resolver
            .as_ref()
            .and_then(|r| r.resolve(specifier, referrer))
            .or_else(|| default_resolve(specifier, referrer))
            .ok_or_else(|| GraphError::Unresolvable {
                specifier: specifier.to_string(),
                referrer: referrer.to_string(),
            })
    }

    /// Arena for one entrypoint. The root is always index 0.
    async fn traverse(&self, entrypoint: &Url) -> Result<Vec<Pending>, GraphError> {
        if self.excludes.contains(entrypoint) {
            return Err(GraphError::InvalidEntrypoint(entrypoint.to_string()));
        }

        let mut arena: Vec<Pending> = Vec::new();
        let mut memo: HashMap<Url, usize> = HashMap::new();
        let mut stack = vec![Step::Visit {
            url: entrypoint.clone(),
            loader: None,
            parent: None,
        }];

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit {
                    url,
                    loader,
                    parent,
                } => {
                    if self.excludes.contains(&url) {
                        continue;
                    }

                    if let Some(&id) = memo.get(&url) {
                        // Only two different declared loaders conflict; an undeclared edge defers.
                        match (arena[id].loader.clone(), loader) {
                            (Some(first), Some(second)) if first != second => {
                                return Err(GraphError::LoaderConflict {
                                    url: url.to_string(),
                                    first: Some(first),
                                    second: Some(second),
                                });
                            }
                            (None, Some(declared)) => arena[id].loader = Some(declared),
                            _ => {}
                        }
                        attach(&mut arena, parent, id);
                        continue;
                    }

                    let analysis = self.analyzer.analyze(&url).await?;
                    let id = arena.len();
                    arena.push(Pending {
                        url: url.clone(),
                        loader,
                        content_hash: analysis.content_hash.clone(),
                        module_hash: None,
                        dependencies: Vec::new(),
                    });
                    memo.insert(url.clone(), id);
                    attach(&mut arena, parent, id);

                    stack.push(Step::Finalize(id));
                    let mut children = Vec::with_capacity(analysis.imports.len());
                    for import in &analysis.imports {
                        children.push(Step::Visit {
                            url: self.resolve(&import.specifier, &url)?,
                            loader: import.loader.clone(),
                            parent: Some(id),
                        });
                    }
                    // Popped in source order.
                    stack.extend(children.into_iter().rev());
                }
                Step::Finalize(id) => {
                    let mut hasher = ContentHasher::new();
                    hasher.fold(&arena[id].content_hash);
                    for &dep in &arena[id].dependencies {
                        match &arena[dep].module_hash {
                            Some(hash) => hasher.fold(hash),
                            None => {
                                debug!(
                                    module = %arena[id].url,
                                    dependency = %arena[dep].url,
                                    "Import cycle, folding content hash"
                                );
                                hasher.fold(&arena[dep].content_hash)
                            }
                        };
                    }
                    arena[id].module_hash = Some(hasher.digest());
                }
            }
        }

        debug!(entrypoint = %entrypoint, modules = arena.len(), "Traversed entrypoint");
        Ok(arena)
    }
}

fn attach(arena: &mut [Pending], parent: Option<usize>, id: usize) {
    if let Some(parent) = parent {
        let deps = &mut arena[parent].dependencies;
        if !deps.contains(&id) {
            deps.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::MemorySourceLoader;
    use crate::graph::ImportMap;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn builder(sources: &[(&str, &str)]) -> (GraphBuilder, Arc<MemorySourceLoader>) {
        let loader: Arc<MemorySourceLoader> =
            Arc::new(sources.iter().map(|(k, v)| (*k, *v)).collect());
        let analyzer = Arc::new(ModuleAnalyzer::new().with_loader(loader.clone()));
        (GraphBuilder::new(analyzer), loader)
    }

    fn diamond(d: &str) -> Vec<(&'static str, String)> {
        vec![
            ("file:///site/a.ts", "import './b.ts';\nimport './c.ts';".to_string()),
            ("file:///site/b.ts", "import './d.ts';".to_string()),
            ("file:///site/c.ts", "import './d.ts';".to_string()),
            ("file:///site/d.ts", d.to_string()),
        ]
    }

    async fn build_diamond(d: &str) -> DependencyGraph {
        let sources = diamond(d);
        let pairs: Vec<(&str, &str)> = sources.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let (builder, _) = builder(&pairs);
        builder.build(&[url("file:///site/a.ts")]).await.unwrap()
    }

    #[tokio::test]
    async fn test_dependency_change_propagates_to_module_hashes() {
        let before = build_diamond("export const d = 1;").await;
        let after = build_diamond("export const d = 2;").await;
        let entry = url("file:///site/a.ts");

        for name in ["a", "b", "c", "d"] {
            let u = url(&format!("file:///site/{}.ts", name));
            let m1 = before.find(&entry, &u).unwrap();
            let m2 = after.find(&entry, &u).unwrap();
            assert_ne!(m1.module_hash, m2.module_hash, "module hash of {}", name);
        }

        let a1 = before.root(&entry).unwrap();
        let a2 = after.root(&entry).unwrap();
        assert_eq!(a1.content_hash, a2.content_hash);
        assert_ne!(before.hash(), after.hash());
    }

    #[tokio::test]
    async fn test_unchanged_sources_hash_identically() {
        let first = build_diamond("export const d = 1;").await;
        let second = build_diamond("export const d = 1;").await;
        assert_eq!(first.hash(), second.hash());
    }

    #[tokio::test]
    async fn test_shared_module_is_a_single_node() {
        let graph = build_diamond("export const d = 1;").await;
        assert_eq!(graph.len(), 4);

        let entry = url("file:///site/a.ts");
        let b = graph.find(&entry, &url("file:///site/b.ts")).unwrap();
        let c = graph.find(&entry, &url("file:///site/c.ts")).unwrap();
        assert_eq!(b.dependencies, c.dependencies);

        let a = graph.root(&entry).unwrap();
        let order: Vec<_> = graph.dependencies(a.id).map(|m| m.url.path().to_string()).collect();
        assert_eq!(order, vec!["/site/b.ts", "/site/c.ts"]);
    }

    #[tokio::test]
    async fn test_shared_modules_are_analyzed_once() {
        let (builder, loader) = builder(&[
            ("file:///site/p1.ts", "import './shared.ts';"),
            ("file:///site/p2.ts", "import './shared.ts';"),
            ("file:///site/shared.ts", "export default 1;"),
        ]);
        let graph = builder
            .build(&[url("file:///site/p1.ts"), url("file:///site/p2.ts")])
            .await
            .unwrap();

        // Separate nodes per entrypoint, single analysis.
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots().len(), 2);
        assert_eq!(loader.reads(), 3);
        assert_eq!(builder.analyzer().analyzed_count(), 3);
    }

    #[tokio::test]
    async fn test_cycle_terminates_deterministically() {
        let sources = [
            ("file:///site/a.ts", "import './b.ts';"),
            ("file:///site/b.ts", "import './a.ts';"),
        ];
        let (first, _) = builder(&sources);
        let (second, _) = builder(&sources);
        let entry = url("file:///site/a.ts");

        let g1 = first.build(&[entry.clone()]).await.unwrap();
        let g2 = second.build(&[entry.clone()]).await.unwrap();
        assert_eq!(g1.len(), 2);
        assert_eq!(g1.hash(), g2.hash());

        let b = g1.find(&entry, &url("file:///site/b.ts")).unwrap();
        assert_eq!(b.dependencies, vec![ModuleId(0)]);
    }

    #[tokio::test]
    async fn test_undeclared_edge_does_not_conflict() {
        for (a, b) in [
            ("import s from './x.css' with { loader: 'style' };\nimport './b.ts';", "import './x.css';"),
            ("import './x.css';\nimport './b.ts';", "import s from './x.css' with { loader: 'style' };"),
        ] {
            let (builder, _) = builder(&[
                ("file:///site/a.ts", a),
                ("file:///site/b.ts", b),
                ("file:///site/x.css", "body {}"),
            ]);
            let entry = url("file:///site/a.ts");
            let graph = builder.build(&[entry.clone()]).await.unwrap();
            let css = graph.find(&entry, &url("file:///site/x.css")).unwrap();
            assert_eq!(css.loader.as_deref(), Some("style"));
            assert_eq!(graph.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_two_declared_loaders_conflict() {
        let (builder, _) = builder(&[
            (
                "file:///site/a.ts",
                "import s from './x.css' with { loader: 'style' };\nimport './b.ts';",
            ),
            ("file:///site/b.ts", "import c from './x.css' with { loader: 'critical' };"),
            ("file:///site/x.css", "body {}"),
        ]);
        let err = builder.build(&[url("file:///site/a.ts")]).await.unwrap_err();
        match err {
            GraphError::LoaderConflict { first, second, .. } => {
                assert_eq!(first.as_deref(), Some("style"));
                assert_eq!(second.as_deref(), Some("critical"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_excluded_urls_are_not_traversed() {
        let (builder, loader) = builder(&[
            ("file:///site/config.ts", "import './pages/index.ts';\nimport './lib.ts';"),
            ("file:///site/pages/index.ts", "import './heavy.ts';"),
            ("file:///site/pages/heavy.ts", "export default 1;"),
            ("file:///site/lib.ts", "export default 1;"),
        ]);
        let builder = builder.with_excludes([url("file:///site/pages/index.ts")]);
        let graph = builder.build(&[url("file:///site/config.ts")]).await.unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(loader.reads(), 2);
        let root = &graph.modules()[0];
        assert_eq!(root.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn test_excluded_entrypoint_is_rejected() {
        let (builder, _) = builder(&[("file:///site/a.ts", "")]);
        let builder = builder.with_excludes([url("file:///site/a.ts")]);
        assert!(matches!(
            builder.build(&[url("file:///site/a.ts")]).await,
            Err(GraphError::InvalidEntrypoint(_))
        ));
    }

    #[tokio::test]
    async fn test_resolver_overrides_bare_specifiers() {
        let (builder, _) = builder(&[
            ("file:///site/a.ts", "import { h } from 'preact';"),
            ("file:///site/vendor/preact.js", "export const h = 1;"),
        ]);
        let map = ImportMap::new(url("file:///site/")).insert("preact", "./vendor/preact.js");
        let builder = builder.with_resolver(Arc::new(map));
        let entry = url("file:///site/a.ts");
        let graph = builder.build(&[entry.clone()]).await.unwrap();
        assert!(graph
            .find(&entry, &url("file:///site/vendor/preact.js"))
            .is_some());
    }

    #[tokio::test]
    async fn test_syntax_error_aborts_build() {
        let (builder, _) = builder(&[
            ("file:///site/a.ts", "import './b.ts';"),
            ("file:///site/b.ts", "export const = ;"),
        ]);
        assert!(matches!(
            builder.build(&[url("file:///site/a.ts")]).await,
            Err(GraphError::Analysis(_))
        ));
    }

    #[tokio::test]
    async fn test_deep_chain_does_not_recurse() {
        let sources: Vec<(String, String)> = (0..5000)
            .map(|i| {
                (
                    format!("file:///site/m{}.ts", i),
                    if i + 1 < 5000 {
                        format!("import './m{}.ts';", i + 1)
                    } else {
                        String::new()
                    },
                )
            })
            .collect();
        let loader: Arc<MemorySourceLoader> = Arc::new(sources.into_iter().collect());
        let analyzer = Arc::new(ModuleAnalyzer::new().with_loader(loader));
        let graph = GraphBuilder::new(analyzer)
            .build(&[url("file:///site/m0.ts")])
            .await
            .unwrap();
        assert_eq!(graph.len(), 5000);
    }
}
