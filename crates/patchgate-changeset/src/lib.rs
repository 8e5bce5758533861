//! # patchgate-changeset
//!
//! The patch request model for patchgate.
//!
//! A [`PatchRequest`] is an ordered batch of [`PatchCommand`]s plus optional
//! [`CommitMetadata`], applied to one repository as a single commit. Requests
//! arrive as JSON in the shape of [`RawPatchRequest`] and are only usable
//! after [`RawPatchRequest::validate`] has checked them:
//!
//! - unknown fields are rejected at every level;
//! - every command has a path and exactly one action;
//! - `setField` paths parse and values are JSON scalars.

pub mod error;
pub mod request;

pub use error::ChangesetError;
pub use request::{
    CommandAction, CommitMetadata, PatchCommand, PatchRequest, RawCommand, RawCommit,
    RawCreateFile, RawDeleteFile, RawPatchRequest, RawSetField, Signature,
};
