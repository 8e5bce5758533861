// server.rs — HTTP surface.
//
//   POST /patch/{repository}   authenticate → validate → look up repository
//                              → authorize → clone, patch, commit, push
//   GET  /healthz              liveness; outside access logging
//
// Status codes: 400 invalid request, 401 authentication, 403 denied by
// policy, 404 unknown repository, 422 command failed, 500 anything else
// (details only in the log).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use patchgate_changeset::{ChangesetError, PatchRequest};
use patchgate_policy::{AuthContext, AuthorizationError, AuthorizationInput, Authorizer};
use patchgate_submit::{CommitIdentity, GitRepository, Pipeline};

use crate::auth::AuthenticationProvider;
use crate::config::Config;
use crate::response::ApiError;

/// Shared, read-only state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authentication: Arc<AuthenticationProvider>,
    pub authorizer: Authorizer,
    pub pipeline: Arc<Pipeline<Arc<dyn GitRepository>>>,
}

pub fn router(state: AppState) -> Router {
    let patch = Router::new()
        .route("/patch/{repository}", post(patch))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http());

    Router::new()
        .merge(patch)
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Verify the caller and attach their [`AuthContext`] to the request.
async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let identity = state.authentication.identify(request.headers()).await;
    match identity {
        Ok(auth) => {
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(err) if err.is_internal() => {
            error!(
                provider = state.authentication.name(),
                error = %err,
                "internal error while authenticating request"
            );
            ApiError::internal("Authentication failed")
                .negotiated(request.headers())
                .into_response()
        }
        Err(err) => {
            warn!(provider = state.authentication.name(), error = %err, "authentication failed");
            ApiError::unauthorized()
                .negotiated(request.headers())
                .into_response()
        }
    }
}

async fn patch(
    State(state): State<AppState>,
    Path(repository): Path<String>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    handle_patch(&state, &repository, &auth, &body)
        .await
        .map_err(|err| err.negotiated(&headers))
}

async fn handle_patch(
    state: &AppState,
    repository: &str,
    auth: &AuthContext,
    body: &[u8],
) -> Result<StatusCode, ApiError> {
    let request = PatchRequest::from_json(body).map_err(|err| {
        warn!(error = %err, "invalid patch request");
        match err {
            ChangesetError::Json(err) => {
                ApiError::client(StatusCode::BAD_REQUEST, "Invalid JSON in body", err.to_string())
            }
            ChangesetError::Invalid(msg) => {
                ApiError::client(StatusCode::BAD_REQUEST, "Validation of request failed", msg)
            }
        }
    })?;

    let remote = state.config.repositories.get(repository).ok_or_else(|| {
        warn!(repo = repository, "unknown repository");
        ApiError::client(
            StatusCode::NOT_FOUND,
            "Unknown repository",
            format!("repository {repository:?} not configured"),
        )
    })?;

    let input = AuthorizationInput {
        repo: repository,
        patch_request: &request,
        auth_ctx: auth,
    };
    state.authorizer.authorize(&input).map_err(|err| match &err {
        AuthorizationError::Denied { .. } => {
            warn!(repo = repository, error = %err, "failed to authorize patch request");
            ApiError::client(
                StatusCode::FORBIDDEN,
                "Authorization failed",
                err.render_violations().unwrap_or_default(),
            )
        }
        AuthorizationError::Evaluation(_) => {
            error!(repo = repository, error = %err, "unexpected error authorizing patch request");
            ApiError::internal("Authorization error")
        }
    })?;

    let identity = CommitIdentity::resolve(&request.commit, &state.config.commit, auth);
    debug!(repo = repository, commands = request.commands.len(), "applying patch request");

    let timeout = state.config.server.request_timeout();
    let run = state.pipeline.run(repository, remote, &request, &identity);
    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(_)) => Ok(StatusCode::OK),
        // Client failures were logged as warnings, others as errors, by the pipeline.
        Ok(Err(failure)) if failure.error.is_client_error() => {
            let mut error = ApiError::client(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Patch failed",
                failure.to_string(),
            );
            if let Some(code) = failure.error.code() {
                error = error.with_code(code);
            }
            Err(error)
        }
        Ok(Err(_)) => Err(ApiError::internal("Patch failed")),
        Err(_) => {
            error!(repo = repository, timeout_secs = timeout.as_secs(), "patch request timed out");
            Err(ApiError::internal("Patch failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
    use axum::http::Request as HttpRequest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use patchgate_policy::{PolicyBundle, RulePolicy};
    use patchgate_submit::{Checkout, Remote, SubmitError};
    use patchgate_workspace::Executor;

    use super::*;
    use crate::auth::tests::{job_token, provider};

    /// Serves a checkout with one file and records what happens to it.
    #[derive(Default)]
    struct FakeGit {
        calls: Mutex<Vec<String>>,
        clone_delay: Option<Duration>,
    }

    #[async_trait]
    impl GitRepository for FakeGit {
        async fn clone_remote(&self, remote: &Remote) -> Result<Checkout, SubmitError> {
            if let Some(delay) = self.clone_delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().unwrap().push(format!("clone {}", remote.url));
            let dir = TempDir::new()?;
            std::fs::create_dir_all(dir.path().join("my-group/my-project"))?;
            std::fs::write(
                dir.path().join("my-group/my-project/values.yaml"),
                "image:\n  tag: 0.1.0\n",
            )?;
            Ok(Checkout::new(dir, "main"))
        }

        async fn stage(&self, _: &Checkout, paths: &[String]) -> Result<bool, SubmitError> {
            self.calls.lock().unwrap().push(format!("stage {}", paths.join(",")));
            Ok(!paths.is_empty())
        }

        async fn commit(
            &self,
            checkout: &Checkout,
            identity: &CommitIdentity,
        ) -> Result<String, SubmitError> {
            let content =
                std::fs::read_to_string(checkout.path().join("my-group/my-project/values.yaml"))?;
            self.calls.lock().unwrap().push(format!(
                "commit {} by {} <{}>: {content:?}",
                identity.message, identity.committer.name, identity.committer.email
            ));
            Ok("abc123".into())
        }

        async fn push(&self, _: &Checkout, _: &Remote) -> Result<(), SubmitError> {
            self.calls.lock().unwrap().push("push".into());
            Ok(())
        }
    }

    const CONFIG: &str = r#"
authenticationProvider:
  type: gitlab
  gitlab: {url: "https://gitlab.example.com"}
repositories:
  infra:
    url: https://git.example.com/infra.git
server:
  requestTimeoutSeconds: 1
"#;

    fn app(git: Arc<FakeGit>) -> Router {
        let config = Config::from_yaml(CONFIG).unwrap();
        let policy = RulePolicy::from_bundle(&PolicyBundle::default()).unwrap();
        let git: Arc<dyn GitRepository> = git;
        router(AppState {
            config: Arc::new(config),
            authentication: Arc::new(AuthenticationProvider::GitLab(provider())),
            authorizer: Authorizer::new(policy),
            pipeline: Arc::new(Pipeline::new(git, Executor::default())),
        })
    }

    fn token() -> String {
        job_token(serde_json::json!({
            "project_path": "my-group/my-project",
            "user_login": "ada",
            "user_email": "ada@example.com"
        }))
    }

    fn patch_request(repo: &str, body: &str) -> HttpRequest<Body> {
        HttpRequest::post(format!("/patch/{repo}"))
            .header(AUTHORIZATION, format!("Bearer {}", token()))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: HttpRequest<Body>) -> (StatusCode, HeaderMap, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    const SET_TAG: &str = r#"{"commands": [{"path": "my-group/my-project/values.yaml", "setField": {"field": "image.tag", "value": "0.2.0"}}]}"#;

    #[tokio::test]
    async fn healthz_needs_no_credentials() {
        let request = HttpRequest::get("/healthz").body(Body::empty()).unwrap();
        let (status, _, _) = send(app(Default::default()), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn successful_patch_is_committed_and_pushed() {
        let git = Arc::new(FakeGit::default());
        let (status, _, _) = send(app(git.clone()), patch_request("infra", SET_TAG)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *git.calls.lock().unwrap(),
            vec![
                "clone https://git.example.com/infra.git".to_string(),
                "stage my-group/my-project/values.yaml".to_string(),
                r#"commit Automated patch by patchgate by ada <ada@example.com>: "image:\n  tag: 0.2.0\n""#.to_string(),
                "push".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_or_bad_credentials_are_rejected() {
        let git = Arc::new(FakeGit::default());
        let anonymous = HttpRequest::post("/patch/infra").body(Body::from(SET_TAG)).unwrap();
        let (status, _, body) = send(app(git.clone()), anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Authentication failed\n");

        let forged = HttpRequest::post("/patch/infra")
            .header(AUTHORIZATION, format!("Bearer {}x", token()))
            .body(Body::from(SET_TAG))
            .unwrap();
        let (status, _, _) = send(app(git.clone()), forged).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(git.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_and_invalid_requests_are_bad_requests() {
        let (status, _, body) = send(app(Default::default()), patch_request("infra", "{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Invalid JSON in body:\n\n"), "{body}");

        let (status, _, body) =
            send(app(Default::default()), patch_request("infra", r#"{"commands": []}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Validation of request failed:\n\nno 'commands' given\n");
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let (status, _, body) =
            send(app(Default::default()), patch_request("website", SET_TAG)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Unknown repository:\n\nrepository \"website\" not configured\n");
    }

    #[tokio::test]
    async fn policy_violations_are_listed() {
        let git = Arc::new(FakeGit::default());
        let mut request = patch_request(
            "infra",
            r#"{"commands": [
                {"path": "other/values.yaml", "deleteFile": {}},
                {"path": "my-group/my-project/app.json", "deleteFile": {}}
            ]}"#,
        );
        request
            .headers_mut()
            .insert(ACCEPT, "application/json".parse().unwrap());
        let (status, _, body) = send(app(git.clone()), request).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["cause"], "Authorization failed");
        assert_eq!(
            json["error"],
            "- commands[0]: path \"other/values.yaml\" is outside the authorized prefix \"my-group/my-project/\"\n\
             - commands[1]: path \"my-group/my-project/app.json\" has unsupported extension (allowed: .yaml, .yml)\n"
        );
        assert!(git.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_command_is_unprocessable_and_not_pushed() {
        let git = Arc::new(FakeGit::default());
        let body = r#"{"commands": [
            {"path": "my-group/my-project/values.yaml", "setField": {"field": "image.tag", "value": "0.2.0"}},
            {"path": "my-group/my-project/missing.yaml", "setField": {"field": "a", "value": 1}}
        ]}"#;
        let (status, headers, text) = send(app(git.clone()), patch_request("infra", body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(headers["x-error-code"], "file_not_found");
        assert_eq!(
            text,
            "Patch failed:\n\napplying patch command to 'my-group/my-project/missing.yaml': \
             file 'my-group/my-project/missing.yaml' does not exist\n"
        );
        assert_eq!(
            *git.calls.lock().unwrap(),
            vec!["clone https://git.example.com/infra.git".to_string()]
        );
    }

    #[tokio::test]
    async fn slow_pipeline_times_out_without_pushing() {
        let git = Arc::new(FakeGit {
            clone_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let (status, _, body) = send(app(git.clone()), patch_request("infra", SET_TAG)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Patch failed\n");
        assert!(git.calls.lock().unwrap().is_empty());
    }
}
