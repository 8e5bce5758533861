// config.rs — Service configuration, loaded once at startup.
//
//   authenticationProvider:
//     type: gitlab
//     gitlab:
//       url: https://gitlab.example.com
//   repositories:
//     my-repo:
//       url: https://git.example.com/group/repo.git
//       basicAuth: { username: bot, password: secret }
//       defaultBranch: main
//   commit:
//     defaultMessage: "Automated patch by patchgate"
//     defaultAuthor: { name: patchgate, email: bot@patchgate }
//   server:
//     requestTimeoutSeconds: 120
//
// Omitted sections take the values of `Config::default()`. The loaded config
// is never changed afterwards; it is shared read-only through the router state.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use patchgate_submit::{CommitDefaults, Remote};

use crate::error::GatewayError;

/// Authentication provider kinds. Exactly one is active per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationProviderType {
    #[serde(rename = "gitlab")]
    GitLab,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitLabConfig {
    /// Base URL of the GitLab instance that issues job tokens.
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationProviderConfig {
    #[serde(rename = "type", default)]
    pub kind: Option<AuthenticationProviderType>,
    /// Must be set for type `gitlab`.
    #[serde(default)]
    pub gitlab: Option<GitLabConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Upper bound for one request, clone to push.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    pub authentication_provider: AuthenticationProviderConfig,
    /// Repositories by the name used in `/patch/{repository}`.
    pub repositories: BTreeMap<String, Remote>,
    pub commit: CommitDefaults,
    pub server: ServerConfig,
}

impl Config {
    /// Parse and validate a YAML config.
    pub fn from_yaml(text: &str) -> Result<Self, GatewayError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let invalid = |msg: String| Err(GatewayError::InvalidConfig(msg));

        if self.repositories.is_empty() {
            return invalid("invalid repositories: empty".into());
        }
        for (name, remote) in &self.repositories {
            if remote.url.trim().is_empty() {
                return invalid(format!("invalid repositories.{name}.url: empty"));
            }
        }
        match (&self.authentication_provider.kind, &self.authentication_provider.gitlab) {
            (None, _) => return invalid("invalid authenticationProvider.type: not set".into()),
            (Some(AuthenticationProviderType::GitLab), None) => {
                return invalid("invalid authenticationProvider.gitlab: required for type gitlab".into())
            }
            (Some(AuthenticationProviderType::GitLab), Some(gitlab))
                if gitlab.url.trim().is_empty() =>
            {
                return invalid("invalid authenticationProvider.gitlab.url: empty".into())
            }
            _ => {}
        }
        let author = &self.commit.default_author;
        if author.name.is_empty() {
            return invalid("invalid commit.defaultAuthor: name required".into());
        }
        if author.email.is_empty() {
            return invalid("invalid commit.defaultAuthor: email required".into());
        }
        if self.server.request_timeout_seconds == 0 {
            return invalid("invalid server.requestTimeoutSeconds: must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
authenticationProvider:
  type: gitlab
  gitlab:
    url: https://gitlab.example.com
repositories:
  infra:
    url: https://git.example.com/group/infra.git
"#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.commit.default_message, "Automated patch by patchgate");
        assert_eq!(config.commit.default_author.name, "patchgate");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(120));
        assert_eq!(
            config.authentication_provider.kind,
            Some(AuthenticationProviderType::GitLab)
        );
        assert!(config.repositories["infra"].basic_auth.is_none());
    }

    #[test]
    fn full_config() {
        let config = Config::from_yaml(
            r#"
authenticationProvider:
  type: gitlab
  gitlab: {url: "https://gitlab.example.com"}
repositories:
  infra:
    url: https://git.example.com/group/infra.git
    basicAuth: {username: bot, password: secret}
    defaultBranch: production
commit:
  defaultMessage: "Patched"
  defaultAuthor: {name: Bot, email: bot@example.com}
server:
  requestTimeoutSeconds: 30
"#,
        )
        .unwrap();
        assert_eq!(config.commit.default_message, "Patched");
        assert_eq!(config.server.request_timeout_seconds, 30);
        let infra = &config.repositories["infra"];
        assert_eq!(infra.default_branch.as_deref(), Some("production"));
        assert_eq!(infra.basic_auth.as_ref().unwrap().password, "secret");
    }

    #[test]
    fn validation_failures() {
        let cases = [
            ("authenticationProvider: {type: gitlab, gitlab: {url: x}}\n", "invalid repositories: empty"),
            (
                "repositories: {a: {url: x}}\n",
                "invalid authenticationProvider.type: not set",
            ),
            (
                "authenticationProvider: {type: gitlab}\nrepositories: {a: {url: x}}\n",
                "invalid authenticationProvider.gitlab: required for type gitlab",
            ),
            (
                "authenticationProvider: {type: gitlab, gitlab: {url: x}}\nrepositories: {a: {url: ''}}\n",
                "invalid repositories.a.url: empty",
            ),
            (
                "authenticationProvider: {type: gitlab, gitlab: {url: x}}\nrepositories: {a: {url: x}}\ncommit: {defaultAuthor: {name: '', email: e}}\n",
                "invalid commit.defaultAuthor: name required",
            ),
        ];
        for (yaml, expected) in cases {
            match Config::from_yaml(yaml) {
                Err(GatewayError::InvalidConfig(msg)) => assert_eq!(msg, expected, "{yaml}"),
                other => panic!("{yaml}: expected InvalidConfig, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_provider_and_fields_are_rejected() {
        assert!(matches!(
            Config::from_yaml("authenticationProvider: {type: github}\n"),
            Err(GatewayError::ConfigParse(_))
        ));
        assert!(matches!(
            Config::from_yaml(&format!("{MINIMAL}listen: ':80'\n")),
            Err(GatewayError::ConfigParse(_))
        ));
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(matches!(Config::load(&path), Err(GatewayError::ConfigRead { .. })));
        std::fs::write(&path, MINIMAL).unwrap();
        assert!(Config::load(&path).unwrap().repositories.contains_key("infra"));
    }
}
