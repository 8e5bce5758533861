//! # patchgate-policy
//!
//! Authorization for patch requests.
//!
//! A request is authorized by evaluating a [`PolicyEngine`] over an
//! [`AuthorizationInput`]: the target repository, the validated patch request
//! and the caller's verified [`AuthContext`]. The built-in [`RulePolicy`]
//! enforces a [`PolicyBundle`] loaded from YAML.
//!
//! ## Key invariants
//!
//! - An empty violation list is the only way to be allowed.
//! - Checks are independent: every failed check contributes its own violation.
//! - An engine error is never reported as a denial.
//! - A prefix template that names a claim the caller lacks denies the request.

pub mod bundle;
pub mod engine;
pub mod error;
pub mod gate;
pub mod input;

pub use bundle::{CustomRule, PolicyBundle};
pub use engine::{PolicyEngine, RulePolicy};
pub use error::PolicyError;
pub use gate::{AuthorizationError, Authorizer};
pub use input::{Audience, AuthContext, AuthorizationInput, GitLabClaims, CLAIM_NAMES};
