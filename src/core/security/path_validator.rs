use std::io;
use std::path::{Component, Path, PathBuf};

/// Errors that can occur during path validation
#[derive(Debug, thiserror::Error)]
pub enum PathSecurityError {
    #[error("Path '{path}' is outside allowed root directory '{root}'")]
    OutsideRootDirectory { path: PathBuf, root: PathBuf },

    #[error("Symlink '{path}' points outside allowed root directory")]
    SymlinkOutsideRoot { path: PathBuf },

    #[error("Path does not exist: '{path}'")]
    PathNotFound { path: PathBuf },

    #[error("IO error for path '{path}': {error}")]
    IoError { path: PathBuf, error: io::Error },
}

/// Resolves a caller-supplied path inside `root`.
///
/// The input is always interpreted relative to the root: a leading `/` is
/// ignored, `.` components are dropped and `..` may not climb above the
/// root. The target does not have to exist (tools create files), but its
/// closest existing ancestor is canonicalized so a symlink cannot smuggle
/// the path out of the root unless `allow_symlinks` is set.
///
/// # Examples
///
/// ```rust,ignore
/// let path = resolve_in_root(&config.paths.storage_base, "/Inbox/notes.md", false)?;
/// ```
pub fn resolve_in_root(
    root: &Path,
    input_path: &str,
    allow_symlinks: bool,
) -> Result<PathBuf, PathSecurityError> {
    let relative = normalize(input_path).ok_or_else(|| PathSecurityError::OutsideRootDirectory {
        path: PathBuf::from(input_path),
        root: root.to_path_buf(),
    })?;
    let resolved = root.join(relative);

    let canonical_root = root.canonicalize().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            PathSecurityError::PathNotFound {
                path: root.to_path_buf(),
            }
        } else {
            PathSecurityError::IoError {
                path: root.to_path_buf(),
                error: e,
            }
        }
    })?;

    if !allow_symlinks {
        let existing = closest_existing_ancestor(&resolved);
        let canonical = existing
            .canonicalize()
            .map_err(|e| PathSecurityError::IoError {
                path: existing.to_path_buf(),
                error: e,
            })?;

        if !is_within_root(&canonical, &canonical_root) {
            return Err(PathSecurityError::SymlinkOutsideRoot { path: resolved });
        }
    }

    Ok(resolved)
}

/// Like [`resolve_in_root`], but the target must already exist.
pub fn resolve_existing(
    root: &Path,
    input_path: &str,
    allow_symlinks: bool,
) -> Result<PathBuf, PathSecurityError> {
    let resolved = resolve_in_root(root, input_path, allow_symlinks)?;
    if resolved.symlink_metadata().is_err() {
        return Err(PathSecurityError::PathNotFound {
            path: PathBuf::from(input_path),
        });
    }
    Ok(resolved)
}

/// Whether `path`, with every symlink followed, lies inside `root`.
///
/// Dangling links and paths that cannot be canonicalized are not confined.
pub fn is_confined(root: &Path, path: &Path) -> bool {
    match (root.canonicalize(), path.canonicalize()) {
        (Ok(root), Ok(path)) => is_within_root(&path, &root),
        _ => false,
    }
}

/// Render `path` relative to `root` with forward slashes.
pub fn display_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically normalize a root-relative path; `None` if it escapes.
fn normalize(input_path: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(input_path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(normalized)
}

fn closest_existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| p.symlink_metadata().is_ok())
        .unwrap_or(path)
}

/// Checks if a path is within (or equal to) a root directory
fn is_within_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_relative_path_within_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("test.txt"), "test").unwrap();

        let result = resolve_existing(temp_dir.path(), "test.txt", false).unwrap();
        assert_eq!(result, temp_dir.path().join("test.txt"));
    }

    #[test]
    fn test_leading_slash_is_root_relative() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_in_root(temp_dir.path(), "/inbox/a.txt", false).unwrap();
        assert_eq!(result, temp_dir.path().join("inbox").join("a.txt"));
    }

    #[test]
    fn test_empty_path_is_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_in_root(temp_dir.path(), "", false).unwrap();
        assert_eq!(result, temp_dir.path());
    }

    #[test]
    fn test_path_traversal_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_in_root(temp_dir.path(), "inbox/../../etc/passwd", false);
        assert!(matches!(
            result,
            Err(PathSecurityError::OutsideRootDirectory { .. })
        ));
    }

    #[test]
    fn test_inner_parent_components_are_resolved() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_in_root(temp_dir.path(), "a/b/../c.txt", false).unwrap();
        assert_eq!(result, temp_dir.path().join("a").join("c.txt"));
    }

    #[test]
    fn test_nonexistent_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_existing(temp_dir.path(), "does_not_exist.txt", false);
        assert!(matches!(result, Err(PathSecurityError::PathNotFound { .. })));
    }

    #[test]
    fn test_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("gone");
        let result = resolve_in_root(&root, "a.txt", false);
        assert!(matches!(result, Err(PathSecurityError::PathNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_root() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let target_file = temp_dir.path().join("target.txt");
        fs::write(&target_file, "test").unwrap();
        symlink(&target_file, temp_dir.path().join("link.txt")).unwrap();

        assert!(resolve_existing(temp_dir.path(), "link.txt", false).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root_blocked() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        symlink(outside_dir.path(), root_dir.path().join("escape")).unwrap();

        let result = resolve_in_root(root_dir.path(), "escape/new.txt", false);
        assert!(matches!(
            result,
            Err(PathSecurityError::SymlinkOutsideRoot { .. })
        ));

        // Following symlinks out of the root is an explicit opt-in.
        assert!(resolve_in_root(root_dir.path(), "escape/new.txt", true).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_confined_follows_links() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        fs::write(root_dir.path().join("inside.txt"), "x").unwrap();
        symlink(outside_dir.path(), root_dir.path().join("out")).unwrap();
        symlink("/nonexistent/target", root_dir.path().join("broken")).unwrap();

        assert!(is_confined(root_dir.path(), &root_dir.path().join("inside.txt")));
        assert!(!is_confined(root_dir.path(), &root_dir.path().join("out")));
        assert!(!is_confined(root_dir.path(), &root_dir.path().join("broken")));
    }

    #[test]
    fn test_display_relative() {
        let root = Path::new("/data/box");
        assert_eq!(
            display_relative(root, Path::new("/data/box/Inbox/a.txt")),
            "Inbox/a.txt"
        );
    }
}
