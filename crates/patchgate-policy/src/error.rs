// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or evaluating policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy bundle file could not be read.
    #[error("reading policy bundle {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy bundle is not valid YAML or has the wrong shape.
    #[error("parsing policy bundle: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A glob pattern in a rule is malformed.
    #[error("invalid pattern '{pattern}' in rule '{rule}': {reason}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        reason: String,
    },

    /// The path prefix template refers to something that is not a claim.
    #[error("invalid path prefix template '{template}': unknown claim '{claim}'")]
    UnknownClaim { template: String, claim: String },

    /// The engine failed to reach a decision.
    #[error("evaluating policy: {0}")]
    Evaluation(String),
}
