//! Credential tuple and scheme selection.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::{Error, Result};

const DEFAULT_PORT: u16 = 443;

/// Which authentication scheme a credential set resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// Static `Api-Token` header.
    ApiToken,
    /// HTTP basic credentials.
    Basic,
    /// Access/refresh token pair acquired with username and password.
    Jwt,
}

impl AuthScheme {
    pub fn name(&self) -> &'static str {
        match self {
            AuthScheme::ApiToken => "api_token",
            AuthScheme::Basic => "basic",
            AuthScheme::Jwt => "jwt",
        }
    }
}

/// Everything needed to authenticate against one API endpoint.
///
/// Also the equality key for authenticator deduplication: two credential
/// sets are equal only when every field, secrets included, is equal.
pub struct Credentials {
    host: String,
    port: u16,
    api_token: Option<SecretString>,
    basic_username: Option<String>,
    basic_password: Option<SecretString>,
    username: Option<String>,
    password: Option<SecretString>,
    tenant: Option<String>,
    tls_verify: bool,
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

fn secrets_equal(a: &Option<SecretString>, b: &Option<SecretString>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
        (None, None) => true,
        _ => false,
    }
}

impl Credentials {
    /// Credentials for `host` on the default HTTPS port with TLS verification on.
    ///
    /// `host` may carry a scheme (`http://127.0.0.1`); without one HTTPS is used.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            api_token: None,
            basic_username: None,
            basic_password: None,
            username: None,
            password: None,
            tenant: None,
            tls_verify: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_basic(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_username = Some(username.into());
        self.basic_password = Some(SecretString::from(password.into()));
        self
    }

    /// Username and password used to acquire bearer tokens.
    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    pub fn api_token(&self) -> Option<&SecretString> {
        self.api_token.as_ref()
    }

    pub fn basic(&self) -> Option<(&str, &SecretString)> {
        match (&self.basic_username, &self.basic_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass)),
            _ => None,
        }
    }

    pub fn login(&self) -> Option<(&str, &SecretString)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass)),
            _ => None,
        }
    }

    /// Resolve the scheme with precedence API token > basic > bearer token.
    pub fn scheme(&self) -> Result<AuthScheme> {
        if self
            .api_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
        {
            return Ok(AuthScheme::ApiToken);
        }
        if self.basic().is_some() {
            return Ok(AuthScheme::Basic);
        }
        if self.login().is_some() {
            return Ok(AuthScheme::Jwt);
        }
        Err(Error::Config(format!(
            "no credentials configured for {}: set an API token, basic credentials or a login",
            self.host
        )))
    }

    /// Root URL of the API, always ending in `/`.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid host '{}': {}", self.host, e)))?;
        url.set_port(Some(self.port))
            .map_err(|_| Error::Config(format!("host '{}' cannot carry a port", self.host)))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            api_token: self.api_token.as_ref().map(clone_secret),
            basic_username: self.basic_username.clone(),
            basic_password: self.basic_password.as_ref().map(clone_secret),
            username: self.username.clone(),
            password: self.password.as_ref().map(clone_secret),
            tenant: self.tenant.clone(),
            tls_verify: self.tls_verify,
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.tenant == other.tenant
            && self.tls_verify == other.tls_verify
            && self.basic_username == other.basic_username
            && self.username == other.username
            && secrets_equal(&self.api_token, &other.api_token)
            && secrets_equal(&self.basic_password, &other.basic_password)
            && secrets_equal(&self.password, &other.password)
    }
}

impl Eq for Credentials {}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tenant", &self.tenant)
            .field("tls_verify", &self.tls_verify)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("basic_username", &self.basic_username)
            .field("username", &self.username)
            .finish()
    }
}
