//! Configuration provider trait.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ConfigError, ConfigResult};

/// A read-only source of configuration values keyed by dotted names
/// (`poll.interval_ms`).
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Raw value for `key`, `None` when this provider does not set it.
    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;
}

/// Typed access on top of [`ConfigProvider::get_raw`].
///
/// Raw values are decoded as JSON first (`8443`, `false`, `0.5`); a value
/// that is not valid JSON is taken as a plain string, so `host=mgmt.local`
/// needs no quoting.
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            match self.get_raw(key).await? {
                Some(raw) => decode(key, raw).map(Some),
                None => Ok(None),
            }
        }
    }

    /// Like [`get`](Self::get), but a missing key is [`ConfigError::NotFound`].
    fn require<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<T>> + Send
    where
        Self: Sync,
    {
        async move {
            self.get(key).await?.ok_or_else(|| ConfigError::NotFound {
                key: key.to_string(),
            })
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

fn decode<T: DeserializeOwned>(key: &str, raw: String) -> ConfigResult<T> {
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_json::from_value(Value::String(raw)).map_err(|_| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: json_err.to_string(),
            }
        }),
    }
}
