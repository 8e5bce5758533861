//! # patchgate-workspace
//!
//! Request-scoped working tree and command executor for patchgate.
//!
//! A [`WorkingTree`] sits on top of a fresh repository checkout and buffers
//! every change in memory. The [`Executor`] runs a request's commands against
//! it in order; only when all of them succeeded does the caller flush the
//! tree to disk and hand the touched paths to the commit.
//!
//! ## Key invariants
//!
//! - **All or nothing**: a failed command leaves the checkout untouched.
//! - **Ordered visibility**: later commands see earlier commands' effects.
//! - **Contained paths**: absolute paths, `..` and `.git/` are rejected.

pub mod error;
pub mod executor;
pub mod tree;

pub use error::WorkspaceError;
pub use executor::{Executor, DEFAULT_EXTENSIONS};
pub use tree::WorkingTree;
