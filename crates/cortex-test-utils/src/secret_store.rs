// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plaintext, process-local secret store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cortex_core::{CortexError, SecretStore};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

/// Keeps secrets in a map. References look like `mem_<n>`.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
    next: AtomicU64,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets.
    pub async fn len(&self) -> usize {
        self.secrets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(&self, secret: &SecretString) -> Result<String, CortexError> {
        let reference = format!("mem_{}", self.next.fetch_add(1, Ordering::Relaxed));
        self.secrets
            .lock()
            .await
            .insert(reference.clone(), secret.expose_secret().to_string());
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Option<SecretString>, CortexError> {
        Ok(self
            .secrets
            .lock()
            .await
            .get(reference)
            .map(|s| SecretString::from(s.clone())))
    }

    async fn delete(&self, reference: &str) -> Result<(), CortexError> {
        self.secrets.lock().await.remove(reference);
        Ok(())
    }
}
