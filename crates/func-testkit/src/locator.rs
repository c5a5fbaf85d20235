//! Locating the function project to start the host in.
//!
//! [`PathLocator`] takes a directory as given. [`ProjectLocator`] finds a
//! project folder by name: from the current directory and from the directory
//! of the running test binary it walks up to the first ancestor holding a
//! root-marker file (a `.sln` by default), then searches that tree for a
//! folder with the project's name.

use crate::error::{FuncTestError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extension of the file that marks the root of a project tree.
pub const DEFAULT_ROOT_MARKER: &str = "sln";

/// Resolves the working directory the host is started in.
pub trait FunctionLocator: Send + Sync {
    fn startup_directory(&self) -> Result<PathBuf>;
}

/// An explicit directory.
#[derive(Debug, Clone)]
pub struct PathLocator {
    path: PathBuf,
}

impl PathLocator {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(FuncTestError::DirectoryNotFound(path));
        }
        Ok(Self { path })
    }
}

impl FunctionLocator for PathLocator {
    fn startup_directory(&self) -> Result<PathBuf> {
        if !self.path.is_dir() {
            return Err(FuncTestError::DirectoryNotFound(self.path.clone()));
        }
        Ok(self.path.clone())
    }
}

/// A project folder found by name under the enclosing project root.
#[derive(Debug, Clone)]
pub struct ProjectLocator {
    directory: PathBuf,
}

impl ProjectLocator {
    /// Search from the current directory, then from the test binary's
    /// directory.
    pub fn new(folder: &str) -> Result<Self> {
        let mut roots = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            roots.push(cwd);
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            roots.push(exe_dir);
        }
        Self::search(folder, &roots, DEFAULT_ROOT_MARKER)
    }

    /// Search from explicit roots for a tree marked by `marker_extension`.
    pub fn search(folder: &str, roots: &[PathBuf], marker_extension: &str) -> Result<Self> {
        let project_root = roots
            .iter()
            .find_map(|root| find_marked_ancestor(root, marker_extension))
            .ok_or_else(|| {
                FuncTestError::DirectoryNotFound(
                    roots.first().cloned().unwrap_or_default(),
                )
            })?;
        debug!("Project root: {}", project_root.display());

        let directory = find_sub_folder(&project_root, folder)
            .ok_or_else(|| FuncTestError::DirectoryNotFound(project_root.join(folder)))?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl FunctionLocator for ProjectLocator {
    fn startup_directory(&self) -> Result<PathBuf> {
        Ok(self.directory.clone())
    }
}

fn has_marker_file(dir: &Path, marker_extension: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|entry| {
        let path = entry.path();
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(marker_extension))
    })
}

fn find_marked_ancestor(start: &Path, marker_extension: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| has_marker_file(dir, marker_extension))
        .map(Path::to_path_buf)
}

fn find_sub_folder(root: &Path, folder: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|entry| {
            entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(folder))
        })
        .map(|entry| entry.into_path())
}
