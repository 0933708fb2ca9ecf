//! Authentication for the management API.
//!
//! Three schemes sit behind the [`Authenticator`] trait:
//! - **API token**: static `Api-Token` header
//! - **Basic**: `Basic base64(user:pass)` header
//! - **Bearer token**: access/refresh pair acquired with a login and
//!   refreshed single-flight when the server rejects it
//!
//! [`AuthenticatorRegistry`] shares one authenticator between every client
//! built from the same [`Credentials`].

mod credential;
mod registry;
mod strategy;

use std::sync::Arc;

pub use credential::{AuthScheme, Credentials};
pub use registry::AuthenticatorRegistry;
pub use strategy::{
    ApiTokenAuth, Authenticator, BasicAuth, JwtAuth, REFRESH_PATH, TENANT_HEADER, TOKEN_PATH,
};

use crate::Result;

/// Build the authenticator for `credentials`, choosing the scheme by
/// precedence: API token, then basic, then bearer token.
pub fn build_authenticator(
    credentials: Credentials,
    http: reqwest::Client,
) -> Result<Arc<dyn Authenticator>> {
    let scheme = credentials.scheme()?;
    tracing::debug!(host = %credentials.host(), scheme = scheme.name(), "Creating authenticator");
    let authenticator: Arc<dyn Authenticator> = match scheme {
        AuthScheme::ApiToken => Arc::new(ApiTokenAuth::new(credentials)?),
        AuthScheme::Basic => Arc::new(BasicAuth::new(credentials)?),
        AuthScheme::Jwt => Arc::new(JwtAuth::new(credentials, http)?),
    };
    Ok(authenticator)
}
