// error.rs — Error types for gateway startup and request authentication.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the gateway from starting.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("reading config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("decoding config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("validating config file: {0}")]
    InvalidConfig(String),

    /// The JSON Web Key Set could not be loaded or contains no usable key.
    #[error("loading JWKS from {url}: {reason}")]
    Jwks { url: String, reason: String },
}

/// Why a request could not be authenticated.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("invalid Bearer scheme in Authorization header")]
    InvalidScheme,

    #[error("malformed JWT: {0}")]
    Malformed(String),

    #[error("JWT signing method {0} is not allowed")]
    UnsupportedAlgorithm(String),

    #[error("no key with id '{0}' in JWKS")]
    UnknownKey(String),

    #[error("JWT signature is invalid")]
    InvalidSignature,

    #[error("JWT is expired")]
    Expired,

    #[error("JWT is not valid yet")]
    NotYetValid,

    /// The key set could not be refreshed. Not the caller's fault.
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

impl AuthenticationError {
    /// Whether the failure lies with the service rather than the credentials.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthenticationError::KeysUnavailable(_))
    }
}
