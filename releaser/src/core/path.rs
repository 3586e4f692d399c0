//! Lexical path cleaning for rendered file targets.

use std::path::{Component, Path, PathBuf};

use crate::core::error::ValidationError;

/// Collapse `.`/`..` segments and duplicate separators without touching the
/// filesystem. `..` never climbs above the root of an absolute path.
pub fn clean_path(raw: &str) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Clean a rendered path and reject results that name no file (`""`, `.`, `/`).
pub fn resolve_target(rendered: &str) -> Result<PathBuf, ValidationError> {
    let cleaned = clean_path(rendered);
    let names_file = cleaned
        .components()
        .any(|c| matches!(c, Component::Normal(_) | Component::ParentDir));
    if !names_file {
        return Err(ValidationError::InvalidPath {
            path: cleaned.display().to_string(),
        });
    }
    Ok(cleaned)
}

/// Base name used as the diagnostic label for content templates.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
