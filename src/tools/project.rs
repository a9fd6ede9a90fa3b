//! `ProjectPort`: project info, `.gitignore`-aware search, workspace tree.

use std::sync::Arc;

use ignore::WalkBuilder;
use serde::Serialize;

use crate::error::ServerError;
use crate::sandbox::PathSandbox;

/// Summary information about the workspace.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    /// The workspace root, as an absolute path string.
    pub root: String,
    /// Whether a `.git` directory was found at the root.
    pub is_git_repository: bool,
    /// Count of files visible under `.gitignore` rules.
    pub file_count: usize,
}

/// One node in a workspace tree listing.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    /// Name of this entry (not a full path).
    pub name: String,
    /// Path relative to the workspace root, POSIX-separated.
    pub relative_path: String,
    /// Whether this node is a directory.
    pub is_directory: bool,
    /// Child nodes, populated only for directories within `max_depth`.
    pub children: Vec<TreeNode>,
}

/// A single search match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    /// Path relative to the workspace root, POSIX-separated.
    pub relative_path: String,
}

/// Project-level introspection scoped to a workspace sandbox.
pub struct ProjectPort {
    sandbox: Arc<PathSandbox>,
}

impl ProjectPort {
    /// Builds a port bound to `sandbox`.
    #[must_use]
    pub fn new(sandbox: Arc<PathSandbox>) -> Self {
        Self { sandbox }
    }

    /// Returns summary information about the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be walked.
    pub fn project_info(&self) -> Result<ProjectInfo, ServerError> {
        let root = self.sandbox.root();
        let is_git_repository = root.join(".git").exists();

        let file_count = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .count();

        Ok(ProjectInfo {
            root: root.display().to_string(),
            is_git_repository,
            file_count,
        })
    }

    /// Searches for files whose relative path matches `pattern` (a glob),
    /// honoring `.gitignore`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidArguments`] if `pattern` is not a
    /// valid glob.
    pub fn search_files(&self, pattern: &str) -> Result<Vec<SearchMatch>, ServerError> {
        let compiled = glob::Pattern::new(pattern).map_err(|e| ServerError::InvalidArguments {
            tool: "search_files".to_string(),
            message: format!("invalid pattern '{pattern}': {e}"),
        })?;

        let root = self.sandbox.root();
        let matches = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(root).ok()?;
                let posix = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                compiled.matches(&posix).then_some(SearchMatch { relative_path: posix })
            })
            .collect();

        Ok(matches)
    }

    /// Builds a workspace tree up to `max_depth`, skipping paths matching
    /// `exclude_patterns`.
    ///
    /// # Errors
    ///
    /// Returns an error if any `exclude_patterns` entry is not a valid glob.
    pub fn workspace_tree(&self, max_depth: u32, exclude_patterns: &[String]) -> Result<TreeNode, ServerError> {
        let compiled_excludes: Vec<glob::Pattern> = exclude_patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<Result<_, _>>()
            .map_err(|e| ServerError::InvalidArguments {
                tool: "workspace_tree".to_string(),
                message: format!("invalid exclude pattern: {e}"),
            })?;

        let root = self.sandbox.root();
        Ok(build_tree(root, root, 0, max_depth, &compiled_excludes))
    }
}

fn build_tree(
    root: &std::path::Path,
    current: &std::path::Path,
    depth: u32,
    max_depth: u32,
    excludes: &[glob::Pattern],
) -> TreeNode {
    let name = current
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| current.display().to_string());
    let relative = current.strip_prefix(root).unwrap_or(current);
    let relative_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let is_directory = current.is_dir();
    let mut children = Vec::new();

    if is_directory && depth < max_depth {
        if let Ok(read_dir) = std::fs::read_dir(current) {
            let mut entries: Vec<_> = read_dir.filter_map(Result::ok).collect();
            entries.sort_by_key(std::fs::DirEntry::file_name);

            for entry in entries {
                let path = entry.path();
                let entry_relative = path.strip_prefix(root).unwrap_or(&path);
                let posix = entry_relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if excludes.iter().any(|p| p.matches(&posix)) {
                    continue;
                }
                children.push(build_tree(root, &path, depth + 1, max_depth, excludes));
            }
        }
    }

    TreeNode {
        name,
        relative_path,
        is_directory,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn project_info_detects_git_repo() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let sandbox = Arc::new(PathSandbox::new(dir.path(), &[]).unwrap());
        let port = ProjectPort::new(sandbox);

        assert!(port.project_info().unwrap().is_git_repository);
    }

    #[test]
    fn search_files_matches_glob() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), b"").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();
        let sandbox = Arc::new(PathSandbox::new(dir.path(), &[]).unwrap());
        let port = ProjectPort::new(sandbox);

        let matches = port.search_files("*.rs").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].relative_path, "a.rs");
    }

    #[test]
    fn workspace_tree_respects_max_depth() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/deep.txt"), b"").unwrap();
        let sandbox = Arc::new(PathSandbox::new(dir.path(), &[]).unwrap());
        let port = ProjectPort::new(sandbox);

        let tree = port.workspace_tree(1, &[]).unwrap();
        let a = &tree.children[0];
        assert_eq!(a.name, "a");
        assert!(a.children.is_empty());
    }
}
