// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opens the database and the credential vault, then assembles the engine.

use std::sync::Arc;

use async_trait::async_trait;
use cortex_agent::Engine;
use cortex_config::CortexConfig;
use cortex_core::{CortexError, SecretStore};
use cortex_storage::Database;
use cortex_vault::Vault;
use secrecy::SecretString;
use tracing::{debug, info};

/// How a command needs the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultAccess {
    /// Never touch the vault.
    Skip,
    /// Unlock it when one exists.
    IfPresent,
    /// Unlock it, creating it first when missing.
    Required,
}

/// Stands in for the vault when it was not unlocked.
struct LockedSecrets;

fn locked() -> CortexError {
    CortexError::Vault(format!(
        "vault is locked; set {} or run interactively to unlock it",
        cortex_vault::VAULT_KEY_ENV_VAR
    ))
}

#[async_trait]
impl SecretStore for LockedSecrets {
    async fn put(&self, _secret: &SecretString) -> Result<String, CortexError> {
        Err(locked())
    }

    async fn get(&self, _reference: &str) -> Result<Option<SecretString>, CortexError> {
        Err(locked())
    }

    async fn delete(&self, _reference: &str) -> Result<(), CortexError> {
        Err(locked())
    }
}

async fn open_secrets(
    config: &CortexConfig,
    db: &Database,
    access: VaultAccess,
) -> Result<Arc<dyn SecretStore>, CortexError> {
    let exists = match access {
        VaultAccess::Skip => return Ok(Arc::new(LockedSecrets)),
        _ => Vault::exists(db).await?,
    };
    if !exists && access == VaultAccess::IfPresent {
        debug!("no vault found, credentials unavailable");
        return Ok(Arc::new(LockedSecrets));
    }

    let passphrase = cortex_vault::read_passphrase(!exists)?;
    let vault = Vault::open_or_create(db.clone(), &passphrase, &config.vault).await?;
    if exists {
        info!("vault unlocked");
    } else {
        info!("vault created");
    }
    Ok(Arc::new(vault))
}

/// Build an engine over the configured database.
pub async fn open_engine(config: CortexConfig, access: VaultAccess) -> Result<Arc<Engine>, CortexError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    let secrets = open_secrets(&config, &db, access).await?;
    let engine = Engine::builder(config, db, secrets).build()?;
    Ok(Arc::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locked_store_refuses_every_operation() {
        let store = LockedSecrets;
        let err = store.get("vault:abc").await.unwrap_err();
        assert_eq!(err.kind(), "vault");
        assert!(err.to_string().contains(cortex_vault::VAULT_KEY_ENV_VAR));
        assert!(store.put(&SecretString::from("k")).await.is_err());
        assert!(store.delete("vault:abc").await.is_err());
    }

    #[tokio::test]
    async fn skip_never_reads_a_passphrase() {
        let db = Database::open_in_memory().await.unwrap();
        let config = CortexConfig::default();
        let secrets = open_secrets(&config, &db, VaultAccess::Skip).await.unwrap();
        assert!(secrets.get("x").await.is_err());
    }

    #[tokio::test]
    async fn missing_vault_stays_locked_when_optional() {
        let db = Database::open_in_memory().await.unwrap();
        let config = CortexConfig::default();
        let secrets = open_secrets(&config, &db, VaultAccess::IfPresent).await.unwrap();
        assert!(secrets.get("x").await.is_err());
    }
}
