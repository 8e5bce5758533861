// error.rs — Error types for decoding and validating patch requests.

use thiserror::Error;

/// Errors that make a patch request unusable. All of them are caused by the
/// caller and never reach the repository.
#[derive(Debug, Error)]
pub enum ChangesetError {
    /// The body is not JSON, or does not have the patch request shape.
    #[error("invalid JSON in body: {0}")]
    Json(#[from] serde_json::Error),

    /// The body decoded but breaks a request rule. The message names the
    /// offending location, e.g. `'commands[0]' is invalid: 'path' must be set`.
    #[error("{0}")]
    Invalid(String),
}
