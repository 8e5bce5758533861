//! # patchgate-yaml
//!
//! Format-preserving YAML patching for patchgate.
//!
//! A [`Document`] parses the first YAML document of a file into an arena of
//! [`Node`]s that remember where they live in the source text. Setting a
//! field resolves a [`PathExpr`] (`spec.containers[0].env[?(@.name=='FOO')].value`)
//! to scalar nodes and rewrites only the bytes of those scalars, so comments,
//! blank lines, key order and quoting elsewhere in the file are kept as they
//! were.
//!
//! ## Key invariants
//!
//! - **Minimal edits**: only the addressed scalars (or the inserted keys)
//!   change; every other byte of the file is preserved.
//! - **Type-preserving encoding**: booleans, numbers and `null` are written
//!   bare, strings are quoted only when a bare token would read back as
//!   something else.
//! - **Filters fan out**: a `[?(@.field=='value')]` segment sets every match;
//!   any other path must address exactly one scalar.
//! - **No positional creation**: keys are only created along paths made of
//!   plain keys; sequences are never extended.

pub mod document;
pub mod error;
mod parser;
pub mod path;
pub mod resolve;
pub mod scalar;
pub mod tree;

pub use document::Document;
pub use error::YamlError;
pub use path::{PathExpr, Predicate, Segment};
pub use resolve::{Target, Vacancy};
pub use scalar::{resolve_plain, ScalarType, ScalarValue};
pub use tree::{Entry, Node, NodeId, NodeKind, Position, Scalar, ScalarStyle};
