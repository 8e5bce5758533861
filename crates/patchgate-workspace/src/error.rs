// error.rs — Error types for the working tree and the command executor.

use std::path::PathBuf;
use thiserror::Error;

use patchgate_yaml::YamlError;

/// Errors that can occur while applying commands to a working tree.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path is absolute, contains `..`, or otherwise escapes the tree.
    #[error("path traversal detected: '{path}' resolves outside the working tree")]
    PathTraversal { path: String },

    /// The command targets a file type that cannot be patched.
    #[error("unsupported file type: '{path}', only {allowed} files are supported")]
    UnsupportedFileType { path: String, allowed: String },

    /// A component of the path is a symbolic link; links are never followed.
    #[error("path '{path}' goes through a symbolic link")]
    Symlink { path: String },

    #[error("file '{path}' does not exist")]
    FileNotFound { path: String },

    #[error("file '{path}' already exists")]
    FileAlreadyExists { path: String },

    /// A file to patch is not UTF-8 text.
    #[error("file '{path}' is not valid UTF-8")]
    NotText { path: String },

    /// Parsing the file or setting the field failed.
    #[error("setting field '{field}' in '{path}': {source}")]
    Field {
        path: String,
        field: String,
        source: YamlError,
    },
}

impl WorkspaceError {
    /// Whether the caller can fix the failure by changing the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            WorkspaceError::IoError { .. } => false,
            WorkspaceError::Field { source, .. } => !matches!(source, YamlError::Rewrite(_)),
            _ => true,
        }
    }

    /// Stable machine-readable code, surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            WorkspaceError::IoError { .. } => "io_error",
            WorkspaceError::PathTraversal { .. } => "invalid_file_path",
            WorkspaceError::Symlink { .. } => "symlink_not_allowed",
            WorkspaceError::UnsupportedFileType { .. } => "unsupported_file_type",
            WorkspaceError::FileNotFound { .. } => "file_not_found",
            WorkspaceError::FileAlreadyExists { .. } => "file_already_exists",
            WorkspaceError::NotText { .. } => "unsupported_file_type",
            WorkspaceError::Field { source, .. } => source.code(),
        }
    }
}
