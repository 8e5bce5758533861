// local_remote.rs — Pipeline runs against a real bare repository.
//
// Each test creates a bare repository with one seed commit on `main` and
// talks to it over a file:// URL, so the git CLI backend is exercised end to
// end: shallow clone, add, commit, rev-parse and push.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::{tempdir, TempDir};

use patchgate_changeset::{PatchRequest, Signature};
use patchgate_policy::{AuthContext, GitLabClaims};
use patchgate_submit::{
    CliGit, CommitDefaults, CommitIdentity, GitRepository, Pipeline, PipelineState, Remote,
    SubmitError,
};
use patchgate_workspace::Executor;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Seeder")
        .env("GIT_AUTHOR_EMAIL", "seed@example.com")
        .env("GIT_COMMITTER_NAME", "Seeder")
        .env("GIT_COMMITTER_EMAIL", "seed@example.com")
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository seeded with `files`, and its file:// URL.
fn seeded_remote(files: &[(&str, &str)]) -> (TempDir, Remote) {
    let root = tempdir().unwrap();
    let bare = root.path().join("remote.git");
    let seed = root.path().join("seed");
    fs::create_dir_all(&bare).unwrap();
    fs::create_dir_all(&seed).unwrap();

    git(&bare, &["init", "--quiet", "--bare", "--initial-branch=main"]);
    git(&seed, &["init", "--quiet", "--initial-branch=main"]);
    for (path, content) in files {
        let full = seed.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    git(&seed, &["add", "--all"]);
    git(&seed, &["commit", "--quiet", "--no-gpg-sign", "-m", "seed"]);
    git(&seed, &["push", "--quiet", bare.to_str().unwrap(), "main"]);

    let remote = Remote::new(format!("file://{}", bare.display()));
    (root, remote)
}

fn remote_git(root: &TempDir, args: &[&str]) -> String {
    git(&root.path().join("remote.git"), args)
}

fn identity(requested: &str) -> CommitIdentity {
    let request = PatchRequest::from_json(requested.as_bytes()).unwrap();
    let auth = AuthContext::gitlab(GitLabClaims {
        user_login: "ada".into(),
        user_email: "ada@example.com".into(),
        ..Default::default()
    });
    CommitIdentity::resolve(&request.commit, &CommitDefaults::default(), &auth)
}

#[tokio::test]
async fn patch_is_pushed_as_one_commit() {
    let (root, remote) = seeded_remote(&[
        (
            "apps/web/values.yaml",
            "# managed by CI\nimage:\n  repository: web\n  tag: 0.1.0 # current\n",
        ),
        ("apps/web/old.yaml", "a: 1\n"),
    ]);
    let body = r#"{
        "commit": {"message": "Deploy web 0.2.0"},
        "commands": [
            {"path": "apps/web/values.yaml", "setField": {"field": "image.tag", "value": "0.2.0"}},
            {"path": "apps/web/new.yaml", "createFile": {"content": "replicas: 2\n"}},
            {"path": "apps/web/old.yaml", "deleteFile": {}}
        ]
    }"#;
    let request = PatchRequest::from_json(body.as_bytes()).unwrap();

    let pipeline = Pipeline::new(CliGit::default(), Executor::default());
    let outcome = pipeline
        .run("web", &remote, &request, &identity(body))
        .await
        .unwrap();

    let head = remote_git(&root, &["rev-parse", "main"]);
    assert_eq!(outcome.commit_id.as_deref(), Some(head.as_str()));
    assert_eq!(
        remote_git(&root, &["show", "main:apps/web/values.yaml"]),
        "# managed by CI\nimage:\n  repository: web\n  tag: 0.2.0 # current"
    );
    assert_eq!(remote_git(&root, &["show", "main:apps/web/new.yaml"]), "replicas: 2");
    assert_eq!(
        remote_git(&root, &["ls-tree", "--name-only", "-r", "main"]),
        "apps/web/new.yaml\napps/web/values.yaml"
    );
    assert_eq!(
        remote_git(&root, &["log", "-1", "--format=%an <%ae>|%cn <%ce>|%s", "main"]),
        "patchgate <bot@patchgate>|ada <ada@example.com>|Deploy web 0.2.0"
    );
}

#[tokio::test]
async fn failed_request_leaves_the_remote_alone() {
    let (root, remote) = seeded_remote(&[("a.yaml", "a: 1\n")]);
    let before = remote_git(&root, &["rev-parse", "main"]);
    let body = r#"{"commands": [
        {"path": "a.yaml", "setField": {"field": "a", "value": 2}},
        {"path": "missing.yaml", "setField": {"field": "a", "value": 2}}
    ]}"#;
    let request = PatchRequest::from_json(body.as_bytes()).unwrap();

    let pipeline = Pipeline::new(CliGit::default(), Executor::default());
    let failure = pipeline
        .run("infra", &remote, &request, &identity(body))
        .await
        .unwrap_err();

    assert_eq!(failure.reached, PipelineState::Cloned);
    assert_eq!(failure.error.code(), Some("file_not_found"));
    assert_eq!(remote_git(&root, &["rev-parse", "main"]), before);
}

#[tokio::test]
async fn idempotent_patch_pushes_nothing() {
    let (root, remote) = seeded_remote(&[("a.yaml", "a: 1\n")]);
    let before = remote_git(&root, &["rev-parse", "main"]);
    let body = r#"{"commands": [{"path": "a.yaml", "setField": {"field": "a", "value": 1}}]}"#;
    let request = PatchRequest::from_json(body.as_bytes()).unwrap();

    let pipeline = Pipeline::new(CliGit::default(), Executor::default());
    let outcome = pipeline
        .run("infra", &remote, &request, &identity(body))
        .await
        .unwrap();

    assert_eq!(outcome.commit_id, None);
    assert_eq!(remote_git(&root, &["rev-parse", "main"]), before);
}

#[tokio::test]
async fn unknown_remote_fails_to_clone() {
    let dir = tempdir().unwrap();
    let remote = Remote::new(format!("file://{}", dir.path().join("nope.git").display()));
    let err = CliGit::default().clone_remote(&remote).await.unwrap_err();
    assert!(matches!(err, SubmitError::CloneFailed(_)), "{err}");
}

#[tokio::test]
async fn concurrent_push_is_rejected_not_merged() {
    let (root, remote) = seeded_remote(&[("a.yaml", "a: 1\n")]);
    let git = CliGit::default();
    let first = git.clone_remote(&remote).await.unwrap();
    let second = git.clone_remote(&remote).await.unwrap();
    assert_eq!(first.branch(), "main");

    let identity = CommitIdentity {
        message: "race".into(),
        author: Signature::new("a", "a@example.com"),
        committer: Signature::new("a", "a@example.com"),
    };
    for (checkout, value) in [(&first, "a: 2\n"), (&second, "a: 3\n")] {
        fs::write(checkout.path().join("a.yaml"), value).unwrap();
        assert!(git.stage(checkout, &["a.yaml".to_string()]).await.unwrap());
        git.commit(checkout, &identity).await.unwrap();
    }

    git.push(&first, &remote).await.unwrap();
    let err = git.push(&second, &remote).await.unwrap_err();
    assert!(
        matches!(err, SubmitError::PushRejected { ref branch, .. } if branch == "main"),
        "{err}"
    );
    assert_eq!(remote_git(&root, &["show", "main:a.yaml"]), "a: 2");
}

#[tokio::test]
async fn staged_paths_are_taken_literally() {
    let (_root, remote) = seeded_remote(&[("a.yaml", "a: 1\n"), ("b.yaml", "b: 1\n")]);
    let cli = CliGit::default();
    let checkout = cli.clone_remote(&remote).await.unwrap();

    fs::write(checkout.path().join("[ab].yaml"), "c: 1\n").unwrap();
    fs::write(checkout.path().join("a.yaml"), "a: 2\n").unwrap();
    fs::write(checkout.path().join("b.yaml"), "b: 2\n").unwrap();

    assert!(cli.stage(&checkout, &["[ab].yaml".to_string()]).await.unwrap());
    assert_eq!(
        git(checkout.path(), &["diff", "--cached", "--name-only"]),
        "[ab].yaml"
    );

    // Magic prefixes are file names too, and this one does not exist.
    let err = cli
        .stage(&checkout, &[":(glob)*.yaml".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::StageFailed(_)), "{err}");
    assert_eq!(
        git(checkout.path(), &["diff", "--cached", "--name-only"]),
        "[ab].yaml"
    );
}
