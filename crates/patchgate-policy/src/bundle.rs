// bundle.rs — Policy bundles: the rules a RulePolicy enforces.
//
// A bundle is a small YAML document:
//
//   allowedExtensions: [".yaml", ".yml"]
//   pathPrefix: "{project_path}/"
//   rules:
//     - name: no-secrets
//       deny: ["**/secrets/**"]
//       message: "path {path} is protected"
//       repositories: ["*"]
//
// The built-in default bundle allows YAML files below the caller's own
// project path and has no custom rules.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// A custom deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomRule {
    pub name: String,
    /// Glob patterns of paths this rule denies.
    pub deny: Vec<String>,
    /// Violation text; `{path}`, `{repo}` and `{rule}` are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Glob patterns of repository names the rule applies to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PolicyBundle {
    /// File extensions (with the leading dot) commands may target.
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Template of the prefix every command path must start with, e.g.
    /// `{project_path}/`. `None` disables the check.
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub rules: Vec<CustomRule>,
}

fn default_extensions() -> Vec<String> {
    vec![".yaml".to_string(), ".yml".to_string()]
}

impl Default for PolicyBundle {
    fn default() -> Self {
        Self {
            allowed_extensions: default_extensions(),
            path_prefix: Some("{project_path}/".to_string()),
            rules: Vec::new(),
        }
    }
}

impl PolicyBundle {
    pub fn from_yaml(text: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }
}
