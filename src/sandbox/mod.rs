//! Path Sandbox.
//!
//! Resolves and authorises every path a tool handler touches against the
//! workspace root, including physical-path (symlink) resolution and a
//! glob-based block-pattern denylist, using the same `glob::MatchOptions`
//! shape as a URL allow/deny matcher, retargeted from remote URLs onto
//! filesystem paths.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::ServerError;

/// The options block-patterns are matched with: dotfiles are not treated
/// specially, negation/comment syntax is not part of glob semantics here,
/// and path separators are significant.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Validates paths against a resolved workspace root plus a glob denylist.
///
/// Stateless per call once constructed; safe to share across concurrent
/// handlers.
pub struct PathSandbox {
    /// The root, resolved through the OS physical-path operation at
    /// construction. This is the sole comparison basis thereafter.
    root: PathBuf,
    /// Compiled denylist patterns, matched against the POSIX-rendered
    /// relative path from `root`.
    blocked: Vec<Pattern>,
}

impl PathSandbox {
    /// Builds a sandbox rooted at `root`.
    ///
    /// `root` is made absolute and resolved through `canonicalize`; if
    /// canonicalization fails (the directory does not exist yet), the
    /// absolute, un-resolved form is used instead.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be made absolute (e.g. `std::env::current_dir`
    /// fails) or if any blocked pattern fails to compile.
    pub fn new(root: &Path, blocked_patterns: &[String]) -> Result<Self, ServerError> {
        let absolute_root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| ServerError::internal("failed to resolve current directory", e))?
                .join(root)
        };

        let resolved_root = std::fs::canonicalize(&absolute_root).unwrap_or(absolute_root);

        let mut blocked = Vec::with_capacity(blocked_patterns.len());
        for raw in blocked_patterns {
            let pattern = Pattern::new(raw).map_err(|e| {
                ServerError::internal(format!("invalid blocked pattern '{raw}'"), e)
            })?;
            blocked.push(pattern);
        }

        Ok(Self {
            root: resolved_root,
            blocked,
        })
    }

    /// Returns the resolved, physical workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates `input_path`, returning the resolved absolute physical
    /// path if it lies within the sandbox root and matches no blocked
    /// pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PathTraversal`] when a relative input escapes
    /// the root, [`ServerError::OutsideRoot`] when an absolute input falls
    /// outside the root, or [`ServerError::BlockedPattern`] when the path
    /// matches the denylist.
    pub fn validate(&self, input_path: &str) -> Result<PathBuf, ServerError> {
        let normalized_input = input_path.replace('\\', "/");
        let is_relative_input = !Path::new(&normalized_input).is_absolute();

        let joined = if is_relative_input {
            self.root.join(&normalized_input)
        } else {
            PathBuf::from(&normalized_input)
        };

        let normalized = normalize_path(&joined);

        let physical = resolve_physical(&normalized);

        let relative = physical.strip_prefix(&self.root).map_err(|_| {
            if is_relative_input {
                ServerError::PathTraversal {
                    attempted_path: input_path.to_string(),
                }
            } else {
                ServerError::OutsideRoot {
                    attempted_path: input_path.to_string(),
                }
            }
        })?;

        let posix_relative = to_posix(relative);
        if self.blocked.iter().any(|p| p.matches_with(&posix_relative, MATCH_OPTIONS)) {
            return Err(ServerError::BlockedPattern {
                attempted_path: input_path.to_string(),
            });
        }

        Ok(physical)
    }
}

/// Collapses `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves `path` through the OS physical-path operation. If the path
/// itself does not exist, resolves the nearest existing ancestor and
/// rejoins the remaining components — this is what defeats a symlinked
/// directory pointing outside the root even when the leaf doesn't exist
/// yet.
fn resolve_physical(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let mut ancestor = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        if ancestor.as_os_str().is_empty() {
            return path.to_path_buf();
        }
        if let Ok(resolved) = std::fs::canonicalize(&ancestor) {
            let mut result = resolved;
            for component in tail.into_iter().rev() {
                result.push(component);
            }
            return result;
        }
        let Some(parent_component) = ancestor.file_name().map(std::ffi::OsStr::to_os_string) else {
            return path.to_path_buf();
        };
        tail.push(parent_component);
        if !ancestor.pop() {
            return path.to_path_buf();
        }
    }
}

/// Renders a relative path in POSIX form (forward slashes) for pattern
/// matching, regardless of host OS separator conventions.
fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn accepts_path_within_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let sandbox = PathSandbox::new(dir.path(), &[]).unwrap();

        let resolved = sandbox.validate("a.txt").unwrap();
        assert!(resolved.starts_with(sandbox.root()));
    }

    #[test]
    fn rejects_relative_traversal() {
        let dir = tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path(), &[]).unwrap();

        let err = sandbox.validate("../outside.txt").unwrap_err();
        assert!(matches!(err, ServerError::PathTraversal { .. }));
    }

    #[test]
    fn rejects_absolute_outside_root() {
        let dir = tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path(), &[]).unwrap();

        let err = sandbox.validate("/etc/passwd").unwrap_err();
        assert!(matches!(err, ServerError::OutsideRoot { .. }));
    }

    #[test]
    fn blocked_pattern_rejects_match() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), b"x").unwrap();
        let sandbox = PathSandbox::new(dir.path(), &[".git/**".to_string()]).unwrap();

        let err = sandbox.validate(".git/config").unwrap_err();
        assert!(matches!(err, ServerError::BlockedPattern { .. }));
    }

    #[test]
    fn accepts_nonexistent_target_within_root() {
        let dir = tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path(), &[]).unwrap();

        let resolved = sandbox.validate("new/nested/file.txt").unwrap();
        assert!(resolved.starts_with(sandbox.root()));
    }

    #[test]
    fn backslash_separators_are_normalized() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/file.txt"), b"x").unwrap();
        let sandbox = PathSandbox::new(dir.path(), &[]).unwrap();

        let resolved = sandbox.validate(r"sub\file.txt").unwrap();
        assert!(resolved.ends_with("file.txt"));
    }
}
