// identity.rs — Who a commit is attributed to and what it says.
//
//   message   = request message, else the configured default
//   author    = request author, else the configured default author
//   committer = request committer, else the caller's user_login/user_email
//               claims when both are present, else the default author

use serde::{Deserialize, Serialize};

use patchgate_changeset::{CommitMetadata, Signature};
use patchgate_policy::AuthContext;

/// Commit settings used when a request does not supply its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CommitDefaults {
    #[serde(default = "default_message")]
    pub default_message: String,
    #[serde(default = "default_author")]
    pub default_author: Signature,
}

fn default_message() -> String {
    "Automated patch by patchgate".to_string()
}

fn default_author() -> Signature {
    Signature::new("patchgate", "bot@patchgate")
}

impl Default for CommitDefaults {
    fn default() -> Self {
        Self {
            default_message: default_message(),
            default_author: default_author(),
        }
    }
}

/// Fully resolved commit message and signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub message: String,
    pub author: Signature,
    pub committer: Signature,
}

impl CommitIdentity {
    pub fn resolve(
        requested: &CommitMetadata,
        defaults: &CommitDefaults,
        auth: &AuthContext,
    ) -> Self {
        let message = requested
            .message
            .clone()
            .unwrap_or_else(|| defaults.default_message.clone());
        let author = requested
            .author
            .clone()
            .unwrap_or_else(|| defaults.default_author.clone());
        let committer = requested
            .committer
            .clone()
            .or_else(|| {
                match (auth.claim("user_login"), auth.claim("user_email")) {
                    (Some(login), Some(email)) => Some(Signature::new(login, email)),
                    _ => None,
                }
            })
            .unwrap_or_else(|| defaults.default_author.clone());

        Self {
            message,
            author,
            committer,
        }
    }
}
