//! Authenticator deduplication.

use std::sync::{Arc, Mutex};

use super::{Authenticator, Credentials, build_authenticator};
use crate::Result;

/// Hands out one shared [`Authenticator`] per distinct [`Credentials`].
///
/// Clients built from equal credentials share the instance, so a token
/// refreshed by one of them is immediately used by all. Lookups are a linear
/// scan; a process talks to a handful of endpoints at most.
#[derive(Debug, Default)]
pub struct AuthenticatorRegistry {
    entries: Mutex<Vec<Arc<dyn Authenticator>>>,
}

impl AuthenticatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the registered authenticator for `credentials`, creating and
    /// registering one if none matches. Never performs network I/O.
    ///
    /// `http` is only used when a new authenticator is created; a reused one
    /// keeps the client it was built with.
    pub fn get_or_create(
        &self,
        credentials: &Credentials,
        http: &reqwest::Client,
    ) -> Result<Arc<dyn Authenticator>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.iter().find(|a| a.matches(credentials)) {
            tracing::debug!(host = %credentials.host(), "Reusing registered authenticator");
            return Ok(Arc::clone(existing));
        }

        let created = build_authenticator(credentials.clone(), http.clone())?;
        entries.push(Arc::clone(&created));
        Ok(created)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every registered authenticator. Clients already holding one
    /// keep using it.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
