// error.rs — Error types for the git capability and the patch pipeline.

use thiserror::Error;

use patchgate_workspace::WorkspaceError;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The git binary could not be started.
    #[error("running git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("cloning repository: {0}")]
    CloneFailed(String),

    /// A patch command failed; nothing was committed.
    #[error("applying patch command to '{path}': {source}")]
    Command {
        index: usize,
        path: String,
        #[source]
        source: WorkspaceError,
    },

    /// Writing the patched files into the checkout failed.
    #[error("writing working tree: {0}")]
    Flush(#[source] WorkspaceError),

    #[error("staging changes: {0}")]
    StageFailed(String),

    #[error("creating commit: {0}")]
    CommitFailed(String),

    /// The remote refused the push, usually because it moved on since the
    /// clone. Nothing is retried; the caller has to resubmit.
    #[error("push to branch '{branch}' was rejected: {message}")]
    PushRejected { branch: String, message: String },

    #[error("pushing to repository: {0}")]
    PushFailed(String),
}

impl SubmitError {
    /// Whether the failure is caused by the request rather than by the
    /// service or the remote.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SubmitError::Command { source, .. } if source.is_client_error())
    }

    /// Machine-readable code of a command failure.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            SubmitError::Command { source, .. } => Some(source.code()),
            _ => None,
        }
    }
}
