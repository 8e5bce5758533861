// engine.rs — Policy evaluation.
//
// A PolicyEngine turns an AuthorizationInput into a list of violations; an
// empty list allows the request. The built-in RulePolicy runs these checks
// for every command, and every failed check adds its own line:
//
// 1. Is the path a clean relative path? → No → violation
// 2. Does the path carry an allowed extension? → No → violation
// 3. Does the path start with the caller's authorized prefix? → No → violation
// 4. Does a custom rule deny the path in this repository? → Yes → violation
//
// Checks never short-circuit each other: a request with three problems gets
// three lines back.

use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::sync::LazyLock;

use crate::bundle::{CustomRule, PolicyBundle};
use crate::error::PolicyError;
use crate::input::{AuthContext, AuthorizationInput, CLAIM_NAMES};

/// Evaluates authorization input into violations.
///
/// Implementations must be pure with respect to the input: the same input
/// yields the same violations. `Err` means no decision could be reached.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, input: &AuthorizationInput<'_>) -> Result<Vec<String>, PolicyError>;
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("static regex is valid"));

/// A prefix template such as `{project_path}/`, checked against the claim
/// names at load time.
#[derive(Debug, Clone)]
struct PrefixTemplate {
    source: String,
    claims: Vec<String>,
}

impl PrefixTemplate {
    fn parse(source: &str) -> Result<Self, PolicyError> {
        let mut claims = Vec::new();
        for capture in PLACEHOLDER.captures_iter(source) {
            let name = &capture[1];
            if !CLAIM_NAMES.contains(&name) {
                return Err(PolicyError::UnknownClaim {
                    template: source.to_string(),
                    claim: name.to_string(),
                });
            }
            claims.push(name.to_string());
        }
        Ok(Self {
            source: source.to_string(),
            claims,
        })
    }

    /// Substitute the caller's claims. Returns the name of the first claim the
    /// caller does not carry when the template cannot be completed.
    fn render(&self, auth: &AuthContext) -> Result<String, String> {
        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(&self.source, |caps: &regex::Captures<'_>| {
            match auth.claim(&caps[1]) {
                Some(value) => value.to_string(),
                None => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(claim) => Err(claim),
            None => Ok(rendered.into_owned()),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    deny: Vec<Pattern>,
    repositories: Vec<Pattern>,
    message: String,
}

impl CompiledRule {
    fn compile(rule: &CustomRule) -> Result<Self, PolicyError> {
        let compile = |pattern: &String| {
            Pattern::new(pattern).map_err(|err| PolicyError::InvalidPattern {
                rule: rule.name.clone(),
                pattern: pattern.clone(),
                reason: err.to_string(),
            })
        };
        Ok(Self {
            name: rule.name.clone(),
            deny: rule.deny.iter().map(compile).collect::<Result<_, _>>()?,
            repositories: rule
                .repositories
                .iter()
                .map(compile)
                .collect::<Result<_, _>>()?,
            message: rule
                .message
                .clone()
                .unwrap_or_else(|| "path {path} is denied by rule {rule}".to_string()),
        })
    }

    fn applies_to(&self, repo: &str) -> bool {
        self.repositories.is_empty()
            || self
                .repositories
                .iter()
                .any(|p| p.matches_with(repo, GLOB_OPTIONS))
    }

    fn denies(&self, path: &str) -> bool {
        self.deny.iter().any(|p| p.matches_with(path, GLOB_OPTIONS))
    }

    fn render(&self, path: &str, repo: &str) -> String {
        self.message
            .replace("{path}", path)
            .replace("{repo}", repo)
            .replace("{rule}", &self.name)
    }
}

/// The built-in rule engine behind a [`PolicyBundle`].
#[derive(Debug, Clone)]
pub struct RulePolicy {
    allowed_extensions: Vec<String>,
    prefix: Option<PrefixTemplate>,
    rules: Vec<CompiledRule>,
}

impl RulePolicy {
    /// Compile a bundle. Malformed globs and unknown claims in the prefix
    /// template are reported here rather than on the first request.
    pub fn from_bundle(bundle: &PolicyBundle) -> Result<Self, PolicyError> {
        Ok(Self {
            allowed_extensions: bundle.allowed_extensions.clone(),
            prefix: bundle
                .path_prefix
                .as_deref()
                .map(PrefixTemplate::parse)
                .transpose()?,
            rules: bundle
                .rules
                .iter()
                .map(CompiledRule::compile)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl PolicyEngine for RulePolicy {
    fn evaluate(&self, input: &AuthorizationInput<'_>) -> Result<Vec<String>, PolicyError> {
        let mut violations = Vec::new();

        let prefix = match &self.prefix {
            None => None,
            Some(template) => match template.render(input.auth_ctx) {
                Ok(prefix) => Some(prefix),
                Err(claim) => {
                    violations.push(format!(
                        "caller has no '{claim}' claim, so no path prefix is authorized"
                    ));
                    None
                }
            },
        };
        let rules: Vec<&CompiledRule> = self
            .rules
            .iter()
            .filter(|rule| rule.applies_to(input.repo))
            .collect();

        for (idx, command) in input.patch_request.commands.iter().enumerate() {
            let path = command.path.as_str();

            if !is_clean_relative_path(path) {
                violations.push(format!(
                    "commands[{idx}]: path {path:?} must be a relative path without '..', '.' or empty segments"
                ));
            }

            if !self
                .allowed_extensions
                .iter()
                .any(|ext| path.ends_with(ext.as_str()))
            {
                violations.push(format!(
                    "commands[{idx}]: path {path:?} has unsupported extension (allowed: {})",
                    self.allowed_extensions.join(", ")
                ));
            }

            if let Some(prefix) = &prefix {
                if !path.starts_with(prefix.as_str()) {
                    violations.push(format!(
                        "commands[{idx}]: path {path:?} is outside the authorized prefix {prefix:?}"
                    ));
                }
            }

            for rule in &rules {
                if rule.denies(path) {
                    violations.push(format!("commands[{idx}]: {}", rule.render(path, input.repo)));
                }
            }
        }

        Ok(violations)
    }
}

fn is_clean_relative_path(path: &str) -> bool {
    !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::GitLabClaims;
    use patchgate_changeset::PatchRequest;

    fn request(paths: &[&str]) -> PatchRequest {
        let commands: Vec<String> = paths
            .iter()
            .map(|p| format!(r#"{{"path": {p:?}, "deleteFile": {{}}}}"#))
            .collect();
        PatchRequest::from_json(format!(r#"{{"commands": [{}]}}"#, commands.join(",")).as_bytes())
            .unwrap()
    }

    fn caller(project_path: &str) -> AuthContext {
        AuthContext::gitlab(GitLabClaims {
            project_path: project_path.into(),
            ..Default::default()
        })
    }

    fn evaluate(
        policy: &RulePolicy,
        repo: &str,
        paths: &[&str],
        auth: &AuthContext,
    ) -> Vec<String> {
        let request = request(paths);
        policy
            .evaluate(&AuthorizationInput {
                repo,
                patch_request: &request,
                auth_ctx: auth,
            })
            .unwrap()
    }

    #[test]
    fn default_bundle_allows_yaml_below_the_project() {
        let policy = RulePolicy::from_bundle(&PolicyBundle::default()).unwrap();
        let violations = evaluate(
            &policy,
            "infra",
            &["group/project/app.yaml", "group/project/deep/values.yml"],
            &caller("group/project"),
        );
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn every_failed_check_reports_its_own_line() {
        let policy = RulePolicy::from_bundle(&PolicyBundle::default()).unwrap();
        let violations = evaluate(
            &policy,
            "infra",
            &["x/y.json", "other/app.yml"],
            &caller("group/project"),
        );
        assert_eq!(
            violations,
            vec![
                r#"commands[0]: path "x/y.json" has unsupported extension (allowed: .yaml, .yml)"#,
                r#"commands[0]: path "x/y.json" is outside the authorized prefix "group/project/""#,
                r#"commands[1]: path "other/app.yml" is outside the authorized prefix "group/project/""#,
            ]
        );
    }

    #[test]
    fn unclean_paths_are_violations() {
        let bundle = PolicyBundle {
            path_prefix: None,
            ..Default::default()
        };
        let policy = RulePolicy::from_bundle(&bundle).unwrap();
        let violations = evaluate(
            &policy,
            "infra",
            &["/etc/a.yaml", "a/../b.yaml", "a//b.yaml", "a\\b.yaml", "ok/a.yaml"],
            &AuthContext::default(),
        );
        assert_eq!(violations.len(), 4);
        assert!(violations.iter().all(|v| v.contains("must be a relative path")));
    }

    #[test]
    fn missing_claim_denies_instead_of_widening() {
        let policy = RulePolicy::from_bundle(&PolicyBundle::default()).unwrap();
        let violations = evaluate(&policy, "infra", &["a.yaml"], &AuthContext::default());
        assert_eq!(
            violations,
            vec!["caller has no 'project_path' claim, so no path prefix is authorized"]
        );
    }

    #[test]
    fn custom_rules_match_globs_and_repositories() {
        let bundle = PolicyBundle::from_yaml(
            r#"
pathPrefix: null
rules:
  - name: no-secrets
    deny: ["**/secrets/**"]
    message: "path {path} is protected in {repo} by {rule}"
    repositories: ["infra-*"]
  - name: no-root-files
    deny: ["*.yaml"]
"#,
        )
        .unwrap();
        let policy = RulePolicy::from_bundle(&bundle).unwrap();
        let auth = AuthContext::default();

        let violations = evaluate(
            &policy,
            "infra-prod",
            &["apps/secrets/db.yaml", "apps/app.yaml", "top.yaml"],
            &auth,
        );
        assert_eq!(
            violations,
            vec![
                "commands[0]: path apps/secrets/db.yaml is protected in infra-prod by no-secrets",
                "commands[2]: path top.yaml is denied by rule no-root-files",
            ]
        );

        let other_repo = evaluate(&policy, "website", &["apps/secrets/db.yaml"], &auth);
        assert!(other_repo.is_empty(), "{other_repo:?}");
    }

    #[test]
    fn load_time_errors() {
        let unknown_claim = PolicyBundle {
            path_prefix: Some("{project}/".into()),
            ..Default::default()
        };
        assert!(matches!(
            RulePolicy::from_bundle(&unknown_claim),
            Err(PolicyError::UnknownClaim { claim, .. }) if claim == "project"
        ));

        let bad_glob =
            PolicyBundle::from_yaml("rules: [{name: broken, deny: ['a/[b']}]\n").unwrap();
        assert!(matches!(
            RulePolicy::from_bundle(&bad_glob),
            Err(PolicyError::InvalidPattern { rule, .. }) if rule == "broken"
        ));
    }

    #[test]
    fn prefix_templates_can_combine_claims() {
        let bundle = PolicyBundle {
            path_prefix: Some("clusters/{namespace_path}/{ref}/".into()),
            ..Default::default()
        };
        let policy = RulePolicy::from_bundle(&bundle).unwrap();
        let auth = AuthContext::gitlab(GitLabClaims {
            namespace_path: "team".into(),
            git_ref: "main".into(),
            ..Default::default()
        });
        assert!(evaluate(&policy, "r", &["clusters/team/main/a.yaml"], &auth).is_empty());
        assert_eq!(
            evaluate(&policy, "r", &["clusters/team/dev/a.yaml"], &auth).len(),
            1
        );
    }
}
