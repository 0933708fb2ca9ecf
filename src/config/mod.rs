//! Layered configuration.
//!
//! ```rust,no_run
//! use mgmt_client::ClientConfig;
//! use mgmt_client::config::ConfigBuilder;
//!
//! # async fn example() -> Result<(), mgmt_client::Error> {
//! let provider = ConfigBuilder::new()
//!     .env()
//!     .file("/etc/mgmt/client.json")
//!     .build();
//! let config = ClientConfig::load(&provider).await?;
//! # Ok(())
//! # }
//! ```

pub mod composite;
pub mod env;
pub mod file;
pub mod memory;
pub mod provider;

pub use composite::CompositeConfigProvider;
pub use env::{DEFAULT_ENV_PREFIX, EnvConfigProvider};
pub use file::FileConfigProvider;
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};

use thiserror::Error;

/// Errors that can occur while reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required key not set by any provider
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Value present but unusable
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Provider error: {message}")]
    Provider { message: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Stacks providers; earlier layers take precedence.
#[derive(Default)]
pub struct ConfigBuilder {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment variables with the `MGMT_` prefix.
    pub fn env(self) -> Self {
        self.provider(EnvConfigProvider::new())
    }

    pub fn env_with_prefix(self, prefix: &str) -> Self {
        self.provider(EnvConfigProvider::prefixed(prefix))
    }

    pub fn file(self, path: impl AsRef<std::path::Path>) -> Self {
        self.provider(FileConfigProvider::new(path.as_ref()))
    }

    pub fn memory(self, provider: MemoryConfigProvider) -> Self {
        self.provider(provider)
    }

    pub fn provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn build(self) -> CompositeConfigProvider {
        let mut composite = CompositeConfigProvider::new();
        for provider in self.providers {
            composite.push(provider);
        }
        composite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound {
            key: "host".to_string(),
        };
        assert!(err.to_string().contains("host"));
    }

    #[tokio::test]
    async fn test_builder_layers_in_order() {
        let provider = ConfigBuilder::new()
            .memory(MemoryConfigProvider::named("cli").value("tenant", "ops"))
            .env_with_prefix("MGMT_CLIENT_BUILDER_TEST_")
            .memory(MemoryConfigProvider::named("defaults").value("tenant", "default"))
            .build();

        assert_eq!(provider.layer_names(), vec!["cli", "env", "defaults"]);
        assert_eq!(provider.get_raw("tenant").await.unwrap().as_deref(), Some("ops"));
    }
}
