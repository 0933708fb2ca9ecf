//! Client session configuration.

use std::time::Duration;

use super::poll::BackoffPolicy;
use crate::auth::Credentials;
use crate::config::{ConfigError, ConfigProvider, ConfigProviderExt, ConfigResult};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a [`Client`](super::Client) needs: endpoint, credentials,
/// request timeout and the default polling policy.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    credentials: Credentials,
    timeout: Duration,
    poll: BackoffPolicy,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self::from_credentials(Credentials::new(host))
    }

    pub fn from_credentials(credentials: Credentials) -> Self {
        Self {
            credentials,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            poll: BackoffPolicy::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.credentials = self.credentials.with_port(port);
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.credentials = self.credentials.with_api_token(token);
        self
    }

    pub fn with_basic(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = self.credentials.with_basic(username, password);
        self
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = self.credentials.with_login(username, password);
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.credentials = self.credentials.with_tenant(tenant);
        self
    }

    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.credentials = self.credentials.with_tls_verify(verify);
        self
    }

    /// Per-request timeout applied by the HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_policy(mut self, poll: BackoffPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_policy(&self) -> &BackoffPolicy {
        &self.poll
    }

    /// Read a configuration from `provider`.
    ///
    /// Keys: `host` (required), `port`, `tls_verify`, `tenant`, `api_token`,
    /// `basic_username`/`basic_password`, `username`/`password`,
    /// `timeout_secs`, `poll.timeout_secs`, `poll.interval_ms`,
    /// `poll.max_interval_ms`, `poll.backoff_factor`.
    pub async fn load<P>(provider: &P) -> ConfigResult<Self>
    where
        P: ConfigProvider + ?Sized,
    {
        let host: String = provider.require("host").await?;
        if host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        let mut config = Self::new(host);

        if let Some(port) = provider.get::<u16>("port").await? {
            if port == 0 {
                return Err(invalid("port", "must be between 1 and 65535"));
            }
            config = config.with_port(port);
        }
        if let Some(verify) = provider.get::<bool>("tls_verify").await? {
            config = config.with_tls_verify(verify);
        }
        if let Some(tenant) = provider.get::<String>("tenant").await? {
            config = config.with_tenant(tenant);
        }
        if let Some(token) = provider.get::<String>("api_token").await? {
            config = config.with_api_token(token);
        }
        if let Some((user, pass)) = pair(provider, "basic_username", "basic_password").await? {
            config = config.with_basic(user, pass);
        }
        if let Some((user, pass)) = pair(provider, "username", "password").await? {
            config = config.with_login(user, pass);
        }
        if let Some(secs) = provider.get::<u64>("timeout_secs").await? {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        let mut poll = BackoffPolicy::default();
        if let Some(secs) = provider.get::<u64>("poll.timeout_secs").await? {
            poll = poll.with_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = provider.get::<u64>("poll.interval_ms").await? {
            poll = poll.with_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = provider.get::<u64>("poll.max_interval_ms").await? {
            poll = poll.with_max_interval(Duration::from_millis(ms));
        }
        if let Some(factor) = provider.get::<f64>("poll.backoff_factor").await? {
            if !factor.is_finite() || factor < 0.0 {
                return Err(invalid("poll.backoff_factor", "must be a non-negative number"));
            }
            poll = poll.with_backoff_factor(factor);
        }
        config.poll = poll;

        tracing::debug!(
            provider = provider.name(),
            host = %config.credentials.host(),
            port = config.credentials.port(),
            "Loaded client configuration"
        );
        Ok(config)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Both keys or neither; one without the other is a configuration mistake.
async fn pair<P>(provider: &P, user_key: &str, pass_key: &str) -> ConfigResult<Option<(String, String)>>
where
    P: ConfigProvider + ?Sized,
{
    let user = provider.get::<String>(user_key).await?;
    let pass = provider.get::<String>(pass_key).await?;
    match (user, pass) {
        (Some(user), Some(pass)) => Ok(Some((user, pass))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::NotFound {
            key: pass_key.to_string(),
        }),
        (None, Some(_)) => Err(ConfigError::NotFound {
            key: user_key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthScheme;
    use crate::config::MemoryConfigProvider;

    #[tokio::test]
    async fn test_load_full() {
        let provider = MemoryConfigProvider::new()
            .value("host", "mgmt.example.com")
            .value("port", "8443")
            .value("tls_verify", "false")
            .value("tenant", "acme")
            .value("username", "admin")
            .value("password", "secret")
            .value("timeout_secs", "15")
            .value("poll.interval_ms", "250")
            .value("poll.max_interval_ms", "4000")
            .value("poll.backoff_factor", "0.5")
            .value("poll.timeout_secs", "120");

        let config = ClientConfig::load(&provider).await.unwrap();
        let creds = config.credentials();
        assert_eq!(creds.host(), "mgmt.example.com");
        assert_eq!(creds.port(), 8443);
        assert!(!creds.tls_verify());
        assert_eq!(creds.tenant(), Some("acme"));
        assert_eq!(creds.scheme().unwrap(), AuthScheme::Jwt);
        assert_eq!(config.timeout(), Duration::from_secs(15));

        let poll = config.poll_policy();
        assert_eq!(poll.interval(), Duration::from_millis(250));
        assert_eq!(poll.max_interval(), Duration::from_secs(4));
        assert_eq!(poll.backoff_factor(), 0.5);
        assert_eq!(poll.timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_load_defaults() {
        let provider = MemoryConfigProvider::new()
            .value("host", "h")
            .value("api_token", "tok");
        let config = ClientConfig::load(&provider).await.unwrap();
        assert_eq!(config.credentials().port(), 443);
        assert!(config.credentials().tls_verify());
        assert_eq!(config.timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.poll_policy(), &BackoffPolicy::default());
    }

    #[tokio::test]
    async fn test_load_requires_host() {
        let err = ClientConfig::load(&MemoryConfigProvider::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { ref key } if key == "host"));
    }

    #[tokio::test]
    async fn test_load_rejects_bad_values() {
        let bad_port = MemoryConfigProvider::new()
            .value("host", "h")
            .value("port", "70000");
        let err = ClientConfig::load(&bad_port).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "port"));

        let bad_factor = MemoryConfigProvider::new()
            .value("host", "h")
            .value("poll.backoff_factor", "-0.5");
        let err = ClientConfig::load(&bad_factor).await.unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "poll.backoff_factor")
        );
    }

    #[tokio::test]
    async fn test_load_accepts_huge_poll_timeout() {
        let provider = MemoryConfigProvider::new()
            .value("host", "h")
            .value("poll.timeout_secs", u64::MAX.to_string());
        let config = ClientConfig::load(&provider).await.unwrap();
        assert_eq!(config.poll_policy().timeout(), Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_load_rejects_half_login() {
        let provider = MemoryConfigProvider::new()
            .value("host", "h")
            .value("basic_username", "ops");
        let err = ClientConfig::load(&provider).await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { ref key } if key == "basic_password"));
    }
}
