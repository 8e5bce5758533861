// gate.rs — Authorization gate in front of the patch pipeline.
//
// The gate owns no policy logic. It hands the input to the engine, logs what
// was decided, and turns the result into either "go ahead", a denial that
// carries every violation, or an evaluation failure (which callers treat as
// an internal error, never as a denial).

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn, Level};

use crate::engine::PolicyEngine;
use crate::error::PolicyError;
use crate::input::AuthorizationInput;

#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The policy denied the request.
    #[error("{}", describe(.violations))]
    Denied { violations: Vec<String> },

    /// The policy engine could not reach a decision.
    #[error(transparent)]
    Evaluation(#[from] PolicyError),
}

fn describe(violations: &[String]) -> String {
    match violations {
        [single] => format!("violation: {single}"),
        many => format!("violations: {}", many.join("; ")),
    }
}

impl AuthorizationError {
    /// The violations as a bulleted list, one `- violation` line each.
    pub fn render_violations(&self) -> Option<String> {
        match self {
            Self::Denied { violations } => {
                Some(violations.iter().map(|v| format!("- {v}\n")).collect())
            }
            Self::Evaluation(_) => None,
        }
    }
}

/// Gate that evaluates a [`PolicyEngine`] for every patch request.
#[derive(Clone)]
pub struct Authorizer {
    engine: Arc<dyn PolicyEngine>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(engine: impl PolicyEngine + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_arc(engine: Arc<dyn PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Allow the request or explain why not.
    pub fn authorize(&self, input: &AuthorizationInput<'_>) -> Result<(), AuthorizationError> {
        if tracing::enabled!(Level::DEBUG) {
            match serde_json::to_string(input) {
                Ok(json) => debug!(input = %json, "evaluating authorization"),
                Err(err) => debug!(error = %err, "authorization input is not serializable"),
            }
        }

        let violations = self.engine.evaluate(input)?;
        if violations.is_empty() {
            debug!(repo = input.repo, "authorization granted");
            return Ok(());
        }
        warn!(
            repo = input.repo,
            violations = violations.len(),
            "authorization denied"
        );
        Err(AuthorizationError::Denied { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PolicyBundle;
    use crate::engine::RulePolicy;
    use crate::input::{AuthContext, GitLabClaims};
    use patchgate_changeset::PatchRequest;

    struct Fixed(Result<Vec<String>, &'static str>);

    impl PolicyEngine for Fixed {
        fn evaluate(&self, _: &AuthorizationInput<'_>) -> Result<Vec<String>, PolicyError> {
            self.0
                .clone()
                .map_err(|msg| PolicyError::Evaluation(msg.to_string()))
        }
    }

    fn check(authorizer: &Authorizer) -> Result<(), AuthorizationError> {
        let request = PatchRequest::from_json(
            br#"{"commands": [{"path": "group/app/a.yaml", "deleteFile": {}}]}"#,
        )
        .unwrap();
        let auth = AuthContext::gitlab(GitLabClaims {
            project_path: "group/app".into(),
            ..Default::default()
        });
        authorizer.authorize(&AuthorizationInput {
            repo: "infra",
            patch_request: &request,
            auth_ctx: &auth,
        })
    }

    #[test]
    fn empty_violation_list_allows() {
        assert!(check(&Authorizer::new(Fixed(Ok(vec![])))).is_ok());
        let rules = RulePolicy::from_bundle(&PolicyBundle::default()).unwrap();
        assert!(check(&Authorizer::new(rules)).is_ok());
    }

    #[test]
    fn denial_carries_every_violation() {
        let authorizer = Authorizer::new(Fixed(Ok(vec!["first".into(), "second".into()])));
        let err = check(&authorizer).unwrap_err();
        assert_eq!(err.to_string(), "violations: first; second");
        assert_eq!(err.render_violations().unwrap(), "- first\n- second\n");

        let single = check(&Authorizer::new(Fixed(Ok(vec!["only".into()])))).unwrap_err();
        assert_eq!(single.to_string(), "violation: only");
    }

    #[test]
    fn engine_failures_are_not_denials() {
        let err = check(&Authorizer::new(Fixed(Err("backend down")))).unwrap_err();
        assert!(matches!(err, AuthorizationError::Evaluation(_)));
        assert!(err.render_violations().is_none());
        assert_eq!(err.to_string(), "evaluating policy: backend down");
    }
}
