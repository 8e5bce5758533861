//! # patchgate-gateway
//!
//! The HTTP face of patchgate: configuration, GitLab job-token
//! authentication and the `/patch/{repository}` endpoint.
//!
//! A request passes through [`AuthenticationProvider`] (who is calling),
//! request validation, the repository lookup in [`Config`], the policy
//! [`Authorizer`](patchgate_policy::Authorizer) (may they touch these paths)
//! and finally the submit [`Pipeline`](patchgate_submit::Pipeline).
//!
//! ## Key invariants
//!
//! - **Authenticate first**: nothing about the request body is read before
//!   the caller's token has been verified.
//! - **Authorize before cloning**: a denied request never reaches git.
//! - **Bounded**: each patch request runs under the configured timeout;
//!   when it expires the run is dropped and its git processes are killed.
//! - **Quiet internals**: 5xx responses carry only a short cause; the details
//!   are in the log.

pub mod auth;
pub mod config;
pub mod error;
pub mod negotiate;
pub mod response;
pub mod server;

pub use auth::{AuthenticationProvider, GitLabProvider, Jwk, Jwks};
pub use config::{
    AuthenticationProviderConfig, AuthenticationProviderType, Config, GitLabConfig, ServerConfig,
};
pub use error::{AuthenticationError, GatewayError};
pub use negotiate::negotiate_content_type;
pub use response::{ApiError, ResponseFormat};
pub use server::{router, AppState};
