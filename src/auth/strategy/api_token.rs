//! Static API token authentication.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;

use super::{Authenticator, insert_authorization, insert_tenant};
use crate::auth::{AuthScheme, Credentials};
use crate::{Error, Result};

/// Sends `Authorization: Api-Token <token>` on every request.
#[derive(Debug)]
pub struct ApiTokenAuth {
    credentials: Credentials,
}

impl ApiTokenAuth {
    pub fn new(credentials: Credentials) -> Result<Self> {
        if credentials.api_token().is_none() {
            return Err(Error::Config("API token authentication needs a token".into()));
        }
        Ok(Self { credentials })
    }
}

#[async_trait]
impl Authenticator for ApiTokenAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::ApiToken
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn authorize(&self) -> Result<()> {
        Ok(())
    }

    fn set_auth_header(&self, headers: &mut HeaderMap) -> Result<()> {
        if let Some(token) = self.credentials.api_token() {
            insert_authorization(headers, format!("Api-Token {}", token.expose_secret()))?;
        }
        insert_tenant(headers, &self.credentials)
    }
}
