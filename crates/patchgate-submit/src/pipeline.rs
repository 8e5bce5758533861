// pipeline.rs — Clone, patch, commit and push one request.
//
//   Idle → Cloned → CommandsApplied → Staged → Committed → Pushed
//     any step may end in Failed, and Failed is terminal
//
// Commands run against an in-memory WorkingTree; the checkout is only
// written once every command succeeded, so a failed command can never end
// up in a commit. Nothing is retried: a rejected push is reported as is.
//
// Each run owns its checkout and shares nothing with other runs, so any
// number of pipelines may run concurrently.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use patchgate_changeset::PatchRequest;
use patchgate_workspace::{Executor, WorkingTree};

use crate::error::SubmitError;
use crate::git::{GitRepository, Remote};
use crate::identity::CommitIdentity;

/// Where a pipeline run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Cloned,
    CommandsApplied,
    Staged,
    Committed,
    Pushed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Cloned => "cloned",
            PipelineState::CommandsApplied => "commands_applied",
            PipelineState::Staged => "staged",
            PipelineState::Committed => "committed",
            PipelineState::Pushed => "pushed",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    /// Paths whose content changed, in command order.
    pub changed: Vec<String>,
    /// The pushed commit, or `None` when the commands left the repository
    /// as it was and nothing had to be pushed.
    pub commit_id: Option<String>,
}

/// A failed run: the error and the last state reached before it.
#[derive(Debug)]
pub struct PipelineFailure {
    pub request_id: Uuid,
    pub reached: PipelineState,
    pub error: SubmitError,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs patch requests against repositories through a [`GitRepository`].
pub struct Pipeline<G> {
    git: G,
    executor: Executor,
}

impl<G: GitRepository> Pipeline<G> {
    pub fn new(git: G, executor: Executor) -> Self {
        Self { git, executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Apply `request` to the repository `repo` at `remote` and push the
    /// result as one commit.
    pub async fn run(
        &self,
        repo: &str,
        remote: &Remote,
        request: &PatchRequest,
        identity: &CommitIdentity,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let request_id = Uuid::new_v4();
        let span = info_span!("pipeline", %request_id, repo);
        let mut run = Run {
            request_id,
            state: PipelineState::Idle,
        };
        let result = self
            .steps(&mut run, remote, request, identity)
            .instrument(span.clone())
            .await;

        result.map_err(|error| {
            span.in_scope(|| {
                let reached = run.state;
                run.advance(PipelineState::Failed);
                if error.is_client_error() {
                    warn!(%reached, error = %error, "patch pipeline failed");
                } else {
                    error!(%reached, error = %error, "patch pipeline failed");
                }
                PipelineFailure {
                    request_id,
                    reached,
                    error,
                }
            })
        })
    }

    async fn steps(
        &self,
        run: &mut Run,
        remote: &Remote,
        request: &PatchRequest,
        identity: &CommitIdentity,
    ) -> Result<PipelineOutcome, SubmitError> {
        let checkout = self.git.clone_remote(remote).await?;
        run.advance(PipelineState::Cloned);

        let mut tree = WorkingTree::new(checkout.path());
        self.executor
            .apply_all(&mut tree, &request.commands)
            .map_err(|(index, source)| SubmitError::Command {
                index,
                path: request.commands[index].path.clone(),
                source,
            })?;
        let changed = tree.flush().map_err(SubmitError::Flush)?;
        run.advance(PipelineState::CommandsApplied);

        let dirty = self.git.stage(&checkout, &changed).await?;
        run.advance(PipelineState::Staged);
        if !dirty {
            info!("patch left the repository unchanged, nothing to push");
            return Ok(PipelineOutcome {
                request_id: run.request_id,
                changed,
                commit_id: None,
            });
        }

        let commit_id = self.git.commit(&checkout, identity).await?;
        run.advance(PipelineState::Committed);

        self.git.push(&checkout, remote).await?;
        run.advance(PipelineState::Pushed);
        info!(
            commit = %commit_id,
            branch = checkout.branch(),
            files = changed.len(),
            "pushed commit to repository"
        );

        Ok(PipelineOutcome {
            request_id: run.request_id,
            changed,
            commit_id: Some(commit_id),
        })
    }
}

struct Run {
    request_id: Uuid,
    state: PipelineState,
}

impl Run {
    fn advance(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }
}
