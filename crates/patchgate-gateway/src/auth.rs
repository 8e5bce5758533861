// auth.rs — Authentication of callers.
//
// The provider set is closed: a process runs with exactly one provider kind,
// selected by `authenticationProvider.type`. GitLab is the only kind today.
//
// GitLab CI job tokens are RS256 JWTs signed with keys published at
// `{gitlab}/oauth/discovery/keys`. The key set is fetched at startup and
// fetched again when a token names a key id we do not know (GitLab rotates
// keys), at most once per REFRESH_INTERVAL.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, info, warn};

use patchgate_policy::{AuthContext, GitLabClaims};

use crate::config::{AuthenticationProviderConfig, AuthenticationProviderType};
use crate::error::{AuthenticationError, GatewayError};

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The configured way of authenticating requests.
#[derive(Debug)]
pub enum AuthenticationProvider {
    GitLab(GitLabProvider),
}

impl AuthenticationProvider {
    pub async fn from_config(
        config: &AuthenticationProviderConfig,
        client: reqwest::Client,
    ) -> Result<Self, GatewayError> {
        match (config.kind, &config.gitlab) {
            (Some(AuthenticationProviderType::GitLab), Some(gitlab)) => Ok(Self::GitLab(
                GitLabProvider::discover(&gitlab.url, client).await?,
            )),
            _ => Err(GatewayError::InvalidConfig(
                "authentication provider is not configured".into(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GitLab(_) => "gitlab",
        }
    }

    /// Verify the caller's credentials and return their identity.
    pub async fn identify(&self, headers: &HeaderMap) -> Result<AuthContext, AuthenticationError> {
        match self {
            Self::GitLab(provider) => provider.identify(headers).await.map(AuthContext::gitlab),
        }
    }
}

/// A JSON Web Key Set, as served by GitLab.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

/// Usable RS256 verification keys by key id. Keys without an id are stored
/// under the empty string.
fn rsa_keys(jwks: &Jwks) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::new();
    for jwk in &jwks.keys {
        if jwk.kty != "RSA"
            || jwk.alg.as_deref().is_some_and(|alg| alg != "RS256")
            || jwk.key_use.as_deref().is_some_and(|u| u != "sig")
        {
            continue;
        }
        let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
            continue;
        };
        match DecodingKey::from_rsa_components(n.trim_end_matches('='), e.trim_end_matches('=')) {
            Ok(key) => {
                keys.insert(jwk.kid.clone().unwrap_or_default(), key);
            }
            Err(err) => warn!(kid = ?jwk.kid, error = %err, "skipping unusable JWK"),
        }
    }
    keys
}

/// Token checks: RS256 only, `exp` and `nbf` enforced when present, no clock
/// leeway. Audience is left to the policy.
fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_required_spec_claims::<&str>(&[]);
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation
}

fn claims_error(err: jsonwebtoken::errors::Error) -> AuthenticationError {
    match err.kind() {
        ErrorKind::InvalidSignature => AuthenticationError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthenticationError::Expired,
        ErrorKind::ImmatureSignature => AuthenticationError::NotYetValid,
        _ => AuthenticationError::Malformed(err.to_string()),
    }
}

/// Verifies GitLab CI job tokens.
pub struct GitLabProvider {
    jwks_url: Option<String>,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: Mutex<Option<Instant>>,
}

impl fmt::Debug for GitLabProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kids: Vec<String> = self
            .keys
            .read()
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("GitLabProvider")
            .field("jwks_url", &self.jwks_url)
            .field("kids", &kids)
            .finish_non_exhaustive()
    }
}

impl GitLabProvider {
    /// Load the key set of the GitLab instance at `base_url`.
    pub async fn discover(base_url: &str, client: reqwest::Client) -> Result<Self, GatewayError> {
        let url = format!("{}/oauth/discovery/keys", base_url.trim_end_matches('/'));
        let jwks = fetch_jwks(&client, &url)
            .await
            .map_err(|reason| GatewayError::Jwks {
                url: url.clone(),
                reason,
            })?;
        let keys = rsa_keys(&jwks);
        if keys.is_empty() {
            return Err(GatewayError::Jwks {
                url,
                reason: "no RS256 signing keys".into(),
            });
        }
        info!(url = %url, keys = keys.len(), "loaded GitLab signing keys");
        Ok(Self {
            jwks_url: Some(url),
            client,
            keys: RwLock::new(keys),
            last_refresh: Mutex::new(Some(Instant::now())),
        })
    }

    /// A provider with a fixed key set that is never refreshed.
    pub fn from_jwks(jwks: &Jwks) -> Self {
        Self {
            jwks_url: None,
            client: reqwest::Client::new(),
            keys: RwLock::new(rsa_keys(jwks)),
            last_refresh: Mutex::new(None),
        }
    }

    pub async fn identify(&self, headers: &HeaderMap) -> Result<GitLabClaims, AuthenticationError> {
        let header = headers
            .get(AUTHORIZATION)
            .ok_or(AuthenticationError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthenticationError::InvalidScheme)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthenticationError::InvalidScheme)?
            .trim();
        self.verify(token).await
    }

    /// Verify `token` against the current time and return its claims.
    pub async fn verify(&self, token: &str) -> Result<GitLabClaims, AuthenticationError> {
        let header =
            decode_header(token).map_err(|err| AuthenticationError::Malformed(err.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthenticationError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header.kid.unwrap_or_default();
        let key = match self.key(&kid) {
            Some(key) => key,
            None => {
                self.refresh().await?;
                self.key(&kid)
                    .ok_or_else(|| AuthenticationError::UnknownKey(kid.clone()))?
            }
        };

        decode::<GitLabClaims>(token, &key, &validation())
            .map(|data| data.claims)
            .map_err(claims_error)
    }

    fn key(&self, kid: &str) -> Option<DecodingKey> {
        let keys = self.keys.read().ok()?;
        match keys.get(kid) {
            Some(key) => Some(key.clone()),
            // A token without a key id is fine while the set has one key.
            None if kid.is_empty() && keys.len() == 1 => keys.values().next().cloned(),
            None => None,
        }
    }

    /// Re-fetch the key set, unless it was fetched recently.
    async fn refresh(&self) -> Result<(), AuthenticationError> {
        let Some(url) = &self.jwks_url else {
            return Ok(());
        };
        {
            let mut last = self
                .last_refresh
                .lock()
                .map_err(|_| AuthenticationError::KeysUnavailable("lock poisoned".into()))?;
            if last.is_some_and(|at| at.elapsed() < REFRESH_INTERVAL) {
                return Ok(());
            }
            *last = Some(Instant::now());
        }

        debug!(url = %url, "refreshing GitLab signing keys");
        let jwks = fetch_jwks(&self.client, url)
            .await
            .map_err(AuthenticationError::KeysUnavailable)?;
        let keys = rsa_keys(&jwks);
        let mut current = self
            .keys
            .write()
            .map_err(|_| AuthenticationError::KeysUnavailable("lock poisoned".into()))?;
        *current = keys;
        Ok(())
    }
}

async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<Jwks, String> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| err.to_string())?;
    response.json::<Jwks>().await.map_err(|err| err.to_string())
}
