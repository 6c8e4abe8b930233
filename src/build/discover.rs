//! Page entrypoint discovery.

use crate::error::BuildError;
use std::path::Path;
use url::Url;
use walkdir::WalkDir;

/// Page files under `pages_dir`, sorted by path.
///
/// Files and directories starting with `_` or `.` are not pages.
pub fn discover_pages(pages_dir: &Path, extensions: &[String]) -> Result<Vec<Url>, BuildError> {
    let root = dunce::canonicalize(pages_dir).map_err(|e| {
        BuildError::Config(format!(
            "Pages directory {} is not readable: {}",
            pages_dir.display(),
            e
        ))
    })?;

    WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .map(|name| name.starts_with('_') || name.starts_with('.'))
                    .unwrap_or(true)
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .map(|e| {
            Url::from_file_path(e.path()).map_err(|_| {
                BuildError::Config(format!("Not an absolute path: {}", e.path().display()))
            })
        })
        .collect()
}
