// error.rs — Error types for document parsing, path resolution and patching.

use thiserror::Error;

use crate::tree::{NodeKind, Position};

/// Errors that can occur while parsing or patching a YAML document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum YamlError {
    /// The document text is not YAML this parser understands.
    #[error("invalid YAML at {position}: {message}")]
    Syntax { position: Position, message: String },

    /// The field path expression could not be parsed.
    #[error("invalid path '{expr}' at offset {offset}: {reason}")]
    InvalidPath {
        expr: String,
        offset: usize,
        reason: String,
    },

    /// No node matched the path and keys were not to be created.
    #[error("no nodes matched path '{path}'")]
    PathNotFound { path: String },

    /// The path resolved to a mapping, sequence or alias instead of a scalar.
    #[error("expected scalar node for '{path}', got {kind} (at {position})")]
    NotScalar {
        path: String,
        kind: NodeKind,
        position: Position,
    },

    /// More than one node matched a path that must address exactly one node.
    #[error("multiple nodes ({matches}) matched path '{path}'")]
    AmbiguousPath { path: String, matches: usize },

    /// Keys cannot be created along this path.
    #[error("cannot create keys for path '{path}': {reason}")]
    CreateUnsupported { path: String, reason: String },

    /// A key had to be created below a node that is not a mapping.
    #[error("cannot create key '{key}' for path '{path}' below {kind} (at {position})")]
    NotAMapping {
        path: String,
        key: String,
        kind: NodeKind,
        position: Position,
    },

    /// The value cannot be written into a scalar slot.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// Re-reading the rewritten document failed; the rewrite is discarded.
    #[error("rewritten document is not valid YAML: {0}")]
    Rewrite(String),
}

impl YamlError {
    /// Stable machine-readable code, surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            YamlError::Syntax { .. } => "invalid_yaml",
            YamlError::InvalidPath { .. } => "invalid_path",
            YamlError::PathNotFound { .. } => "field_not_found",
            YamlError::NotScalar { .. } => "not_scalar",
            YamlError::AmbiguousPath { .. } => "ambiguous_path",
            YamlError::CreateUnsupported { .. } => "create_unsupported",
            YamlError::NotAMapping { .. } => "not_a_mapping",
            YamlError::UnsupportedValue(_) => "unsupported_value",
            YamlError::Rewrite(_) => "rewrite_failed",
        }
    }
}
