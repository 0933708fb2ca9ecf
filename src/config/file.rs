//! JSON file configuration provider.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::RwLock;

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

/// Reads a JSON object from disk, lazily on first access.
///
/// Dotted keys walk nested objects: `poll.interval_ms` reads
/// `{"poll": {"interval_ms": 500}}`. A missing file provides nothing.
#[derive(Debug)]
pub struct FileConfigProvider {
    path: PathBuf,
    document: RwLock<Option<Value>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached document; the next read goes back to disk.
    pub async fn reload(&self) -> ConfigResult<()> {
        let fresh = self.read_document().await?;
        *self.document.write().await = Some(fresh);
        Ok(())
    }

    async fn read_document(&self) -> ConfigResult<Value> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Config file not found, skipping");
                return Ok(Value::Object(Default::default()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let document: Value = serde_json::from_str(&content)?;
        if !document.is_object() {
            return Err(ConfigError::Provider {
                message: format!("{} must contain a JSON object", self.path.display()),
            });
        }
        Ok(document)
    }

    async fn lookup(&self, key: &str) -> ConfigResult<Option<Value>> {
        if self.document.read().await.is_none() {
            let fresh = self.read_document().await?;
            let mut slot = self.document.write().await;
            if slot.is_none() {
                *slot = Some(fresh);
            }
        }

        let document = self.document.read().await;
        Ok(document
            .as_ref()
            .and_then(|doc| key.split('.').try_fold(doc, |node, part| node.get(part)))
            .cloned())
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(match self.lookup(key).await? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProviderExt;
    use tempfile::TempDir;

    async fn write_config(dir: &TempDir, value: serde_json::Value) -> PathBuf {
        let path = dir.path().join("mgmt.json");
        tokio::fs::write(&path, value.to_string()).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_nested_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            serde_json::json!({
                "host": "mgmt.example.com",
                "port": 8443,
                "tls_verify": false,
                "poll": {"interval_ms": 250, "backoff_factor": 0.5}
            }),
        )
        .await;

        let provider = FileConfigProvider::new(path);
        assert_eq!(
            provider.get_raw("host").await.unwrap().as_deref(),
            Some("mgmt.example.com")
        );
        assert_eq!(provider.get::<u16>("port").await.unwrap(), Some(8443));
        assert_eq!(provider.get::<bool>("tls_verify").await.unwrap(), Some(false));
        assert_eq!(provider.get::<u64>("poll.interval_ms").await.unwrap(), Some(250));
        assert_eq!(provider.get::<f64>("poll.backoff_factor").await.unwrap(), Some(0.5));
        assert_eq!(provider.get_raw("poll.missing").await.unwrap(), None);
        assert_eq!(provider.get_raw("host.deeper").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("absent.json"));
        assert_eq!(provider.get_raw("host").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, serde_json::json!([1, 2, 3])).await;
        let provider = FileConfigProvider::new(path);
        assert!(matches!(
            provider.get_raw("host").await,
            Err(ConfigError::Provider { .. })
        ));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, serde_json::json!({"tenant": "a"})).await;
        let provider = FileConfigProvider::new(path.clone());
        assert_eq!(provider.get_raw("tenant").await.unwrap().as_deref(), Some("a"));

        tokio::fs::write(&path, r#"{"tenant": "b"}"#).await.unwrap();
        assert_eq!(provider.get_raw("tenant").await.unwrap().as_deref(), Some("a"));

        provider.reload().await.unwrap();
        assert_eq!(provider.get_raw("tenant").await.unwrap().as_deref(), Some("b"));
    }
}
