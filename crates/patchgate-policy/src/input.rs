// input.rs — What the policy engine gets to see about a request.
//
// The authorization input bundles the target repository, the validated patch
// request and the caller's verified identity. It serializes to
//
//   {"repo": "...", "patchRequest": {...}, "authCtx": {"gitLabClaims": {...}}}
//
// so that a logged input reads like the request that produced it.

use serde::{Deserialize, Serialize};

use patchgate_changeset::PatchRequest;

/// The `aud` claim: a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

/// Claims of a GitLab CI job token (`CI_JOB_JWT` / ID token).
///
/// GitLab encodes ids and flags as strings; they are kept that way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    #[serde(default)]
    pub namespace_id: String,
    #[serde(default)]
    pub namespace_path: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub project_path: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default)]
    pub pipeline_source: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub ref_type: String,
    #[serde(default)]
    pub ref_protected: String,
}

/// Names accepted by [`GitLabClaims::claim`].
pub const CLAIM_NAMES: &[&str] = &[
    "namespace_id",
    "namespace_path",
    "project_id",
    "project_path",
    "user_id",
    "user_login",
    "user_email",
    "pipeline_id",
    "pipeline_source",
    "job_id",
    "ref",
    "ref_type",
    "ref_protected",
    "sub",
];

impl GitLabClaims {
    /// Look up a string claim by its JWT name. Empty claims read as absent.
    pub fn claim(&self, name: &str) -> Option<&str> {
        let value = match name {
            "namespace_id" => &self.namespace_id,
            "namespace_path" => &self.namespace_path,
            "project_id" => &self.project_id,
            "project_path" => &self.project_path,
            "user_id" => &self.user_id,
            "user_login" => &self.user_login,
            "user_email" => &self.user_email,
            "pipeline_id" => &self.pipeline_id,
            "pipeline_source" => &self.pipeline_source,
            "job_id" => &self.job_id,
            "ref" => &self.git_ref,
            "ref_type" => &self.ref_type,
            "ref_protected" => &self.ref_protected,
            "sub" => return self.sub.as_deref().filter(|s| !s.is_empty()),
            _ => return None,
        };
        Some(value.as_str()).filter(|s| !s.is_empty())
    }
}

/// The verified identity of a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    #[serde(rename = "gitLabClaims", skip_serializing_if = "Option::is_none")]
    pub gitlab_claims: Option<GitLabClaims>,
}

impl AuthContext {
    pub fn gitlab(claims: GitLabClaims) -> Self {
        Self {
            gitlab_claims: Some(claims),
        }
    }

    /// Look up a claim from whichever provider authenticated the caller.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.gitlab_claims.as_ref().and_then(|c| c.claim(name))
    }
}

/// Everything a policy decision is based on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationInput<'a> {
    pub repo: &'a str,
    pub patch_request: &'a PatchRequest,
    pub auth_ctx: &'a AuthContext,
}
