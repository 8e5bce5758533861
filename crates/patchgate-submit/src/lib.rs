//! # patchgate-submit
//!
//! Turns a validated patch request into a pushed commit.
//!
//! [`Pipeline`] clones the target repository through a [`GitRepository`],
//! applies the request's commands to an in-memory working tree, and stages,
//! commits and pushes the result. [`CliGit`] implements the git capability
//! with the `git` command line.
//!
//! ## Key invariants
//!
//! - **Atomic**: if any command fails, nothing is committed or pushed.
//! - **Isolated**: each run clones into its own temporary directory, removed
//!   on every exit path.
//! - **No retries**: clone and push failures, including rejected pushes, are
//!   reported to the caller unchanged.
//! - **Cancellable**: dropping a run kills any git process it started.

pub mod error;
pub mod git;
pub mod identity;
pub mod pipeline;

pub use error::SubmitError;
pub use git::{BasicAuth, Checkout, CliGit, GitRepository, Remote};
pub use identity::{CommitDefaults, CommitIdentity};
pub use pipeline::{Pipeline, PipelineFailure, PipelineOutcome, PipelineState};
