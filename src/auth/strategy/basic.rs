//! HTTP basic authentication.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;

use super::{Authenticator, insert_authorization, insert_tenant};
use crate::auth::{AuthScheme, Credentials};
use crate::{Error, Result};

/// Sends `Authorization: Basic <base64(user:pass)>` on every request.
#[derive(Debug)]
pub struct BasicAuth {
    credentials: Credentials,
}

impl BasicAuth {
    pub fn new(credentials: Credentials) -> Result<Self> {
        if credentials.basic().is_none() {
            return Err(Error::Config(
                "basic authentication needs a username and password".into(),
            ));
        }
        Ok(Self { credentials })
    }
}

#[async_trait]
impl Authenticator for BasicAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn authorize(&self) -> Result<()> {
        Ok(())
    }

    fn set_auth_header(&self, headers: &mut HeaderMap) -> Result<()> {
        if let Some((user, pass)) = self.credentials.basic() {
            let encoded = STANDARD.encode(format!("{}:{}", user, pass.expose_secret()));
            insert_authorization(headers, format!("Basic {encoded}"))?;
        }
        insert_tenant(headers, &self.credentials)
    }
}
