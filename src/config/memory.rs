//! In-memory configuration provider.

use std::collections::HashMap;
use std::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

/// Key/value pairs set in code; handy for tests and for overriding other
/// layers in a [`CompositeConfigProvider`](super::CompositeConfigProvider).
#[derive(Debug)]
pub struct MemoryConfigProvider {
    name: String,
    values: RwLock<HashMap<String, String>>,
}

impl Default for MemoryConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            name: "memory".to_string(),
            values: RwLock::new(values),
        }
    }

    /// Builder-style insert.
    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ConfigProvider for MemoryConfigProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }
}
