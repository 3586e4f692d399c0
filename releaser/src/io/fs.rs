//! Filesystem writes for rendered files and persisted records.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::error::IoError;

/// Create the parent directories of `target` if it has any.
pub fn ensure_parent_dir(target: &Path) -> Result<(), IoError> {
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|source| IoError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Write rendered content, creating parents and overwriting any existing file.
/// Returns the number of bytes written.
pub fn write_rendered(target: &Path, content: &str) -> Result<usize, IoError> {
    ensure_parent_dir(target)?;
    fs::write(target, content).map_err(|source| IoError::Write {
        path: target.to_path_buf(),
        source,
    })?;
    Ok(content.len())
}

/// Atomically replace `path` (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_rendered_creates_parents_and_overwrites() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("a/b/c.txt");

        assert_eq!(write_rendered(&target, "first").expect("write"), 5);
        assert_eq!(write_rendered(&target, "2nd").expect("overwrite"), 3);
        assert_eq!(fs::read_to_string(&target).expect("read"), "2nd");
    }

    #[test]
    fn write_rendered_reports_directory_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("file");
        fs::write(&blocker, "x").expect("write blocker");

        let err = write_rendered(&blocker.join("child.txt"), "x").expect_err("blocked");
        assert!(matches!(err, IoError::CreateDir { .. }));
        assert!(err.to_string().starts_with("failed to create directory"));
    }

    #[test]
    fn write_rendered_reports_write_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = write_rendered(temp.path(), "x").expect_err("directory target");
        assert!(matches!(err, IoError::Write { .. }));
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("record.json");
        write_atomic(&path, "{}\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}\n");
        assert!(!temp.path().join("record.json.tmp").exists());
    }
}
