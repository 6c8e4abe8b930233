//! Static import extraction
//!
//! Parses script modules with swc and walks import and re-export
//! declarations. Type-only forms are skipped. An import attribute
//! `with { loader: "name" }` pins the edge to a named asset loader.

use crate::error::AnalysisError;
use swc_common::{sync::Lrc, FileName, FilePathMapping, SourceMap};
use swc_ecma_ast::{
    ExportAll, Expr, ImportDecl, Lit, NamedExport, ObjectLit, Prop, PropName, PropOrSpread, Str,
};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_visit::{Visit, VisitWith};
use url::Url;

/// One static dependency edge as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub specifier: String,
    pub loader: Option<String>,
}

/// Extracts static dependency edges from module source.
pub trait SyntaxAnalyzer: Send + Sync {
    /// Whether `url` is a module this analyzer parses. Other modules are leaves.
    fn handles(&self, url: &Url) -> bool;

    fn imports(&self, url: &Url, source: &str) -> Result<Vec<Import>, AnalysisError>;
}

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

fn extension(url: &Url) -> Option<&str> {
    let name = url.path_segments()?.last()?;
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// swc-backed [`SyntaxAnalyzer`] for JavaScript and TypeScript.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcSyntax;

impl SwcSyntax {
    pub fn new() -> Self {
        SwcSyntax
    }

    fn syntax_for(url: &Url) -> Syntax {
        match extension(url) {
            Some(ext @ ("ts" | "mts" | "cts" | "tsx")) => Syntax::Typescript(TsSyntax {
                tsx: ext == "tsx",
                ..Default::default()
            }),
            _ => Syntax::Es(EsSyntax {
                jsx: true,
                ..Default::default()
            }),
        }
    }
}

impl SyntaxAnalyzer for SwcSyntax {
    fn handles(&self, url: &Url) -> bool {
        extension(url)
            .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
    }

    fn imports(&self, url: &Url, source: &str) -> Result<Vec<Import>, AnalysisError> {
        let cm: Lrc<SourceMap> = Lrc::new(SourceMap::new(FilePathMapping::empty()));
        let file_name = Lrc::new(FileName::Custom(url.to_string()));
        let source_file = cm.new_source_file(file_name, source.to_string());
        let lexer = Lexer::new(
            Self::syntax_for(url),
            Default::default(),
            StringInput::from(&*source_file),
            None,
        );
        let mut parser = Parser::new_from(lexer);
        let module = parser.parse_module().map_err(|e| AnalysisError::Syntax {
            url: url.to_string(),
            reason: format!("{:?}", e.kind()),
        })?;

        let mut collector = ImportCollector::default();
        module.visit_with(&mut collector);
        Ok(collector.imports)
    }
}

#[derive(Default)]
struct ImportCollector {
    imports: Vec<Import>,
}

impl ImportCollector {
    fn push(&mut self, src: &Str, with: Option<&ObjectLit>) {
        let specifier = src.value.to_string_lossy();
        self.imports.push(Import {
            specifier: specifier.to_string(),
            loader: with.and_then(loader_attribute),
        });
    }
}

impl Visit for ImportCollector {
    fn visit_import_decl(&mut self, node: &ImportDecl) {
        if !node.type_only {
            self.push(&node.src, node.with.as_deref());
        }
    }

    fn visit_named_export(&mut self, node: &NamedExport) {
        if node.type_only {
            return;
        }
        if let Some(src) = &node.src {
            self.push(src, node.with.as_deref());
        }
    }

    fn visit_export_all(&mut self, node: &ExportAll) {
        if !node.type_only {
            self.push(&node.src, node.with.as_deref());
        }
    }
}

fn loader_attribute(with: &ObjectLit) -> Option<String> {
    with.props.iter().find_map(|prop| {
        let PropOrSpread::Prop(prop) = prop else {
            return None;
        };
        let Prop::KeyValue(pair) = &**prop else {
            return None;
        };
        let key: &str = match &pair.key {
            PropName::Ident(ident) => ident.sym.as_ref(),
            PropName::Str(s) => s.value.as_str()?,
            _ => return None,
        };
        if key != "loader" {
            return None;
        }
        match &*pair.value {
            Expr::Lit(Lit::Str(s)) => {
                let value = s.value.to_string_lossy();
                Some(value.to_string())
            }
            _ => None,
        }
    })
}
