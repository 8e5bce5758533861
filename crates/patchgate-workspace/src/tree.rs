// tree.rs — Request-scoped working tree over a repository checkout.
//
// A WorkingTree reads through to the checkout on disk but keeps every write
// and delete in memory until `flush()` is called. Commands in one request
// therefore see each other's effects, while a request that fails halfway
// leaves the checkout exactly as it was cloned: the pending changes are
// simply dropped with the tree.
//
// Key design:
// - Pending changes are keyed by relative path; `None` marks a deletion
// - Touch order is recorded so staging follows command order
// - Paths are validated before any disk access, and no component of a path
//   may be a symlink, so reads and writes never leave the checkout

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::WorkspaceError;

/// A file-tree snapshot of one checkout, with changes buffered in memory.
pub struct WorkingTree {
    /// Root of the checkout on disk.
    root: PathBuf,

    /// Pending content per relative path; `None` means deleted.
    pending: HashMap<String, Option<Vec<u8>>>,

    /// Relative paths in the order they were first changed.
    touched: Vec<String>,
}

impl WorkingTree {
    /// Open a working tree over the checkout at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: HashMap::new(),
            touched: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `relative_path` exists, taking pending changes into account.
    pub fn exists(&self, relative_path: &str) -> Result<bool, WorkspaceError> {
        let full_path = self.resolve_path(relative_path)?;
        match self.pending.get(relative_path) {
            Some(pending) => Ok(pending.is_some()),
            None => Ok(full_path.is_file()),
        }
    }

    /// Read a file, preferring pending content over the checkout.
    pub fn read_file(&self, relative_path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let full_path = self.resolve_path(relative_path)?;
        match self.pending.get(relative_path) {
            Some(Some(content)) => return Ok(content.clone()),
            Some(None) => {
                return Err(WorkspaceError::FileNotFound {
                    path: relative_path.to_string(),
                })
            }
            None => {}
        }

        match fs::read(&full_path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == ErrorKind::NotFound || full_path.is_dir() => {
                Err(WorkspaceError::FileNotFound {
                    path: relative_path.to_string(),
                })
            }
            Err(source) => Err(WorkspaceError::IoError {
                path: full_path,
                source,
            }),
        }
    }

    /// Buffer new content for a file.
    pub fn write_file(
        &mut self,
        relative_path: &str,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), WorkspaceError> {
        self.resolve_path(relative_path)?;
        self.touch(relative_path);
        self.pending
            .insert(relative_path.to_string(), Some(content.into()));
        Ok(())
    }

    /// Buffer the removal of an existing file.
    pub fn remove_file(&mut self, relative_path: &str) -> Result<(), WorkspaceError> {
        if !self.exists(relative_path)? {
            return Err(WorkspaceError::FileNotFound {
                path: relative_path.to_string(),
            });
        }
        self.touch(relative_path);
        self.pending.insert(relative_path.to_string(), None);
        Ok(())
    }

    /// Relative paths changed so far, in first-touch order.
    pub fn touched(&self) -> &[String] {
        &self.touched
    }

    /// Write all pending changes to the checkout and return the paths that
    /// changed on disk. Nothing reaches the disk before this is called.
    pub fn flush(self) -> Result<Vec<String>, WorkspaceError> {
        let mut changed = Vec::with_capacity(self.touched.len());
        for path in &self.touched {
            let full_path = self.resolve_path(path)?;
            match self.pending.get(path) {
                Some(Some(content)) => {
                    if let Some(parent) = full_path.parent() {
                        fs::create_dir_all(parent).map_err(|source| {
                            WorkspaceError::IoError {
                                path: parent.to_path_buf(),
                                source,
                            }
                        })?;
                    }
                    fs::write(&full_path, content).map_err(|source| WorkspaceError::IoError {
                        path: full_path.clone(),
                        source,
                    })?;
                    changed.push(path.clone());
                }
                Some(None) => match fs::remove_file(&full_path) {
                    // Created and deleted within the same request.
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(WorkspaceError::IoError {
                            path: full_path,
                            source,
                        })
                    }
                    Ok(()) => changed.push(path.clone()),
                },
                None => {}
            }
        }
        debug!(root = %self.root.display(), files = changed.len(), "flushed working tree");
        Ok(changed)
    }

    fn touch(&mut self, relative_path: &str) {
        if !self.touched.iter().any(|p| p == relative_path) {
            self.touched.push(relative_path.to_string());
        }
    }

    /// Resolve a relative path to an absolute path within the checkout.
    /// Rejects absolute paths, `..` and `.` segments, backslashes and the
    /// repository metadata directory.
    fn resolve_path(&self, relative_path: &str) -> Result<PathBuf, WorkspaceError> {
        let traversal = || WorkspaceError::PathTraversal {
            path: relative_path.to_string(),
        };

        if relative_path.is_empty()
            || relative_path.contains('\\')
            || relative_path.split('/').any(|s| s.is_empty() || s == "." || s == "..")
        {
            return Err(traversal());
        }
        let relative = Path::new(relative_path);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(traversal());
        }
        if relative
            .components()
            .next()
            .is_some_and(|first| first.as_os_str() == ".git")
        {
            return Err(traversal());
        }

        let full_path = self.root.join(relative);
        self.reject_symlinks(relative_path, relative)?;
        Ok(full_path)
    }

    /// Fail if any existing component of `relative` is a symbolic link.
    /// Components below the first missing one do not exist yet and will be
    /// created as plain directories.
    fn reject_symlinks(&self, relative_path: &str, relative: &Path) -> Result<(), WorkspaceError> {
        let mut current = self.root.clone();
        for component in relative.components() {
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(WorkspaceError::Symlink {
                        path: relative_path.to_string(),
                    })
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(source) => {
                    return Err(WorkspaceError::IoError {
                        path: current,
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}
