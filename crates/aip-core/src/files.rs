//! Glob listing relative to a root directory.

use std::path::Path;

use glob::{GlobError, MatchOptions, Pattern, PatternError};

/// Why a listing could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("cannot read {}: {}", .0.path().display(), .0.error())]
    Walk(#[from] GlobError),
}

/// Regular files under `root` matching `pattern`, as sorted root-relative paths
/// with `/` separators. A missing root yields an empty list; a directory that
/// cannot be read fails the whole listing.
pub fn glob_relative(
    root: &Path,
    pattern: &str,
    case_sensitive: bool,
) -> Result<Vec<String>, ListError> {
    // validate the caller's part on its own so errors point at it
    Pattern::new(pattern)?;

    let root_str = root.to_string_lossy();
    let full = format!(
        "{}/{}",
        Pattern::escape(root_str.trim_end_matches('/')),
        pattern.trim_start_matches('/')
    );
    let options = MatchOptions {
        case_sensitive,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut out = Vec::new();
    for entry in glob::glob_with(&full, options)? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        if let Some(rel) = relative(root, &path) {
            out.push(rel);
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
