// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret store used to keep agent credentials encrypted at rest.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::CortexError;

/// Stores secrets and hands out opaque references to them.
///
/// References are safe to persist next to the owning record; only the store
/// can turn them back into secret material.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Stores a secret and returns its opaque reference.
    async fn put(&self, secret: &SecretString) -> Result<String, CortexError>;

    /// Resolves a reference. `Ok(None)` when the reference is unknown.
    async fn get(&self, reference: &str) -> Result<Option<SecretString>, CortexError>;

    /// Deletes a secret. Deleting an unknown reference is not an error.
    async fn delete(&self, reference: &str) -> Result<(), CortexError>;
}
