// git.rs — The git capability the pipeline needs, and its git CLI backend.
//
// The pipeline only ever clones, stages, commits and pushes, so that is the
// whole trait. CliGit drives the `git` binary:
//
// - clones are shallow and single-branch, into a TempDir owned by the Checkout
// - credentials travel as an `http.extraHeader` set through GIT_CONFIG_*
//   environment variables, so they never appear in URLs, argv or .git/config
// - every child is spawned with kill_on_drop, so dropping the pipeline future
//   (timeout, client gone) kills an in-flight clone or push

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::SubmitError;
use crate::identity::CommitIdentity;

/// Username and password for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicAuth {
    fn header(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        format!("Authorization: Basic {token}")
    }
}

/// Where a repository lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Remote {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    /// Branch to clone and push; the remote's HEAD branch when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl Remote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            basic_auth: None,
            default_branch: None,
        }
    }
}

/// A fresh clone owned by one request. The directory is removed when the
/// checkout is dropped.
#[derive(Debug)]
pub struct Checkout {
    dir: TempDir,
    branch: String,
}

impl Checkout {
    pub fn new(dir: TempDir, branch: impl Into<String>) -> Self {
        Self {
            dir,
            branch: branch.into(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The branch that was cloned and will be pushed.
    pub fn branch(&self) -> &str {
        &self.branch
    }
}

/// Git operations needed to turn a working tree into a pushed commit.
#[async_trait]
pub trait GitRepository: Send + Sync {
    /// Clone `remote` into a new, request-owned checkout.
    async fn clone_remote(&self, remote: &Remote) -> Result<Checkout, SubmitError>;

    /// Stage additions, changes and deletions of `paths`. Returns whether the
    /// index now differs from HEAD.
    async fn stage(&self, checkout: &Checkout, paths: &[String]) -> Result<bool, SubmitError>;

    /// Commit the index and return the new commit id.
    async fn commit(
        &self,
        checkout: &Checkout,
        identity: &CommitIdentity,
    ) -> Result<String, SubmitError>;

    /// Push HEAD to the cloned branch of `remote`.
    async fn push(&self, checkout: &Checkout, remote: &Remote) -> Result<(), SubmitError>;
}

#[async_trait]
impl<T: GitRepository + ?Sized> GitRepository for Arc<T> {
    async fn clone_remote(&self, remote: &Remote) -> Result<Checkout, SubmitError> {
        (**self).clone_remote(remote).await
    }

    async fn stage(&self, checkout: &Checkout, paths: &[String]) -> Result<bool, SubmitError> {
        (**self).stage(checkout, paths).await
    }

    async fn commit(
        &self,
        checkout: &Checkout,
        identity: &CommitIdentity,
    ) -> Result<String, SubmitError> {
        (**self).commit(checkout, identity).await
    }

    async fn push(&self, checkout: &Checkout, remote: &Remote) -> Result<(), SubmitError> {
        (**self).push(checkout, remote).await
    }
}

/// [`GitRepository`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct CliGit {
    program: PathBuf,
}

impl Default for CliGit {
    fn default() -> Self {
        Self::new("git")
    }
}

impl CliGit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, cwd: Option<&Path>, auth: Option<&BasicAuth>) -> Command {
        let mut cmd = Command::new(&self.program);
        // Paths come from callers, so pathspec magic and globs stay literal.
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_LITERAL_PATHSPECS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        if let Some(auth) = auth {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", auth.header());
        }
        cmd
    }

    async fn output(mut cmd: Command, args: &[&str]) -> Result<Output, SubmitError> {
        debug!(args = ?args, "running git");
        Ok(cmd.args(args).output().await?)
    }

    /// Run git and return trimmed stdout, or stderr as the error text.
    async fn run(cmd: Command, args: &[&str]) -> Result<String, String> {
        let output = Self::output(cmd, args)
            .await
            .map_err(|err| err.to_string())?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

#[async_trait]
impl GitRepository for CliGit {
    async fn clone_remote(&self, remote: &Remote) -> Result<Checkout, SubmitError> {
        let dir = tempfile::Builder::new()
            .prefix("patchgate-")
            .tempdir()
            .map_err(|err| SubmitError::CloneFailed(err.to_string()))?;
        let target = dir.path().to_string_lossy().into_owned();

        let mut args = vec!["clone", "--quiet", "--depth", "1", "--single-branch", "--no-tags"];
        if let Some(branch) = &remote.default_branch {
            args.extend(["--branch", branch.as_str()]);
        }
        args.extend(["--", remote.url.as_str(), target.as_str()]);
        Self::run(self.command(None, remote.basic_auth.as_ref()), &args)
            .await
            .map_err(SubmitError::CloneFailed)?;

        let branch = match &remote.default_branch {
            Some(branch) => branch.clone(),
            None => Self::run(
                self.command(Some(dir.path()), None),
                &["symbolic-ref", "--short", "HEAD"],
            )
            .await
            .map_err(SubmitError::CloneFailed)?,
        };

        info!(url = %remote.url, branch = %branch, "cloned repository");
        Ok(Checkout::new(dir, branch))
    }

    async fn stage(&self, checkout: &Checkout, paths: &[String]) -> Result<bool, SubmitError> {
        if paths.is_empty() {
            return Ok(false);
        }
        let mut args = vec!["add", "--all", "--"];
        args.extend(paths.iter().map(String::as_str));
        Self::run(self.command(Some(checkout.path()), None), &args)
            .await
            .map_err(SubmitError::StageFailed)?;

        // Exit status 1 means the index differs from HEAD.
        let diff = Self::output(
            self.command(Some(checkout.path()), None),
            &["diff", "--cached", "--quiet"],
        )
        .await?;
        match diff.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(SubmitError::StageFailed(
                String::from_utf8_lossy(&diff.stderr).trim().to_string(),
            )),
        }
    }

    async fn commit(
        &self,
        checkout: &Checkout,
        identity: &CommitIdentity,
    ) -> Result<String, SubmitError> {
        let mut cmd = self.command(Some(checkout.path()), None);
        cmd.env("GIT_AUTHOR_NAME", &identity.author.name)
            .env("GIT_AUTHOR_EMAIL", &identity.author.email)
            .env("GIT_COMMITTER_NAME", &identity.committer.name)
            .env("GIT_COMMITTER_EMAIL", &identity.committer.email);
        Self::run(
            cmd,
            &[
                "commit",
                "--quiet",
                "--no-verify",
                "--no-gpg-sign",
                "--message",
                &identity.message,
            ],
        )
        .await
        .map_err(SubmitError::CommitFailed)?;

        Self::run(
            self.command(Some(checkout.path()), None),
            &["rev-parse", "HEAD"],
        )
        .await
        .map_err(SubmitError::CommitFailed)
    }

    async fn push(&self, checkout: &Checkout, remote: &Remote) -> Result<(), SubmitError> {
        let refspec = format!("HEAD:refs/heads/{}", checkout.branch());
        let output = Self::output(
            self.command(Some(checkout.path()), remote.basic_auth.as_ref()),
            &["push", "--porcelain", "origin", &refspec],
        )
        .await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout);
        // Porcelain marks refused refs with a leading '!'.
        if stdout.lines().any(|line| line.starts_with('!'))
            || stderr.contains("[rejected]")
            || stderr.contains("non-fast-forward")
        {
            return Err(SubmitError::PushRejected {
                branch: checkout.branch().to_string(),
                message: stderr,
            });
        }
        Err(SubmitError::PushFailed(stderr))
    }
}
