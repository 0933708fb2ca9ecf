//! Authenticator trait.

use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::auth::{AuthScheme, Credentials};
use crate::{Error, Result};

/// Header carrying the tenant when one is configured.
pub const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant");

/// One authentication scheme bound to one credential set.
///
/// Implementations are shared behind `Arc` by every client session using the
/// same credentials, so all methods take `&self` and must be safe to call
/// concurrently.
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    /// The scheme this authenticator implements.
    fn scheme(&self) -> AuthScheme;

    /// The credentials this authenticator was built from.
    fn credentials(&self) -> &Credentials;

    /// Make sure a usable credential exists, acquiring or refreshing it if the
    /// scheme has state. Static schemes return immediately.
    async fn authorize(&self) -> Result<()>;

    /// Authorize only if no credential has been established yet.
    ///
    /// Unlike checking [`is_initialized`](Self::is_initialized) before
    /// calling [`authorize`](Self::authorize), stateful schemes decide this
    /// atomically, so a caller racing a just-finished exchange reuses its
    /// token instead of starting another one.
    async fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.authorize().await
    }

    /// Attach the authorization (and tenant) headers to `headers`.
    fn set_auth_header(&self, headers: &mut HeaderMap) -> Result<()>;

    /// Whether a credential has been successfully established at least once.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Structural equality over the credential tuple, used for deduplication.
    fn matches(&self, credentials: &Credentials) -> bool {
        self.credentials() == credentials
    }
}

pub(crate) fn insert_authorization(headers: &mut HeaderMap, value: String) -> Result<()> {
    let mut value = HeaderValue::try_from(value)
        .map_err(|e| Error::InvalidRequest(format!("credential is not a valid header value: {e}")))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

pub(crate) fn insert_tenant(headers: &mut HeaderMap, credentials: &Credentials) -> Result<()> {
    if let Some(tenant) = credentials.tenant() {
        let value = HeaderValue::from_str(tenant)
            .map_err(|e| Error::InvalidRequest(format!("invalid tenant '{tenant}': {e}")))?;
        headers.insert(TENANT_HEADER, value);
    }
    Ok(())
}
