// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault lifecycle and the [`SecretStore`] implementation.
//!
//! A single `vault_meta` row named `header` holds the KDF parameters, salt
//! and the wrapped master key. Rotating the passphrase rewrites only that
//! row; entries stay sealed under the unchanged master key.

use async_trait::async_trait;
use cortex_config::model::VaultConfig;
use cortex_core::{CortexError, SecretStore};
use cortex_storage::{map_tr_err, Database};
use ring::aead::NONCE_LEN;
use rusqlite::{params, OptionalExtension};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::{self, SealedBox};
use crate::kdf::{self, KdfParams};

/// Prefix of every reference handed out by [`Vault::put`](SecretStore::put).
pub const CREDENTIAL_PREFIX: &str = "cred_";

const HEADER_KEY: &str = "header";
const SALT_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct VaultHeader {
    kdf: KdfParams,
    salt: String,
    nonce: String,
    wrapped_key: String,
}

impl VaultHeader {
    fn seal(
        master_key: &[u8; 32],
        passphrase: &SecretString,
        kdf: KdfParams,
    ) -> Result<Self, CortexError> {
        let salt = crypto::random_bytes::<SALT_LEN>()?;
        let wrapping_key = kdf::derive_key(passphrase.expose_secret().as_bytes(), &salt, &kdf)?;
        let sealed = crypto::seal(&wrapping_key, master_key)?;
        Ok(Self {
            kdf,
            salt: hex::encode(salt),
            nonce: hex::encode(sealed.nonce),
            wrapped_key: hex::encode(sealed.ciphertext),
        })
    }

    fn unwrap_master_key(
        &self,
        passphrase: &SecretString,
    ) -> Result<Zeroizing<[u8; 32]>, CortexError> {
        let salt = decode_hex(&self.salt, "salt")?;
        let nonce: [u8; NONCE_LEN] = decode_hex(&self.nonce, "nonce")?
            .try_into()
            .map_err(|_| corrupted("nonce"))?;
        let sealed = SealedBox {
            ciphertext: decode_hex(&self.wrapped_key, "wrapped key")?,
            nonce,
        };

        let wrapping_key =
            kdf::derive_key(passphrase.expose_secret().as_bytes(), &salt, &self.kdf)?;
        let master = Zeroizing::new(crypto::open(&wrapping_key, &sealed).map_err(|_| {
            CortexError::Vault("invalid passphrase or corrupted vault".to_string())
        })?);
        let key: [u8; 32] = master
            .as_slice()
            .try_into()
            .map_err(|_| corrupted("master key"))?;
        Ok(Zeroizing::new(key))
    }
}

fn decode_hex(value: &str, what: &str) -> Result<Vec<u8>, CortexError> {
    hex::decode(value).map_err(|_| corrupted(what))
}

fn corrupted(what: &str) -> CortexError {
    CortexError::Vault(format!("corrupted vault {what}"))
}

/// An unlocked vault. The master key lives only in memory.
pub struct Vault {
    master_key: Zeroizing<[u8; 32]>,
    db: Database,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl Vault {
    async fn read_header(db: &Database) -> Result<Option<VaultHeader>, CortexError> {
        let raw = db
            .connection()
            .call(|conn| -> Result<Option<Vec<u8>>, rusqlite::Error> {
                conn.query_row(
                    "SELECT value FROM vault_meta WHERE key = ?1",
                    params![HEADER_KEY],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(|_| corrupted("header")))
            .transpose()
    }

    async fn write_header(db: &Database, header: &VaultHeader) -> Result<(), CortexError> {
        let bytes = serde_json::to_vec(header)
            .map_err(|e| CortexError::Vault(format!("failed to encode vault header: {e}")))?;
        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO vault_meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![HEADER_KEY, bytes],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Whether a vault has been initialized in this database.
    pub async fn exists(db: &Database) -> Result<bool, CortexError> {
        Ok(Self::read_header(db).await?.is_some())
    }

    /// Initialize a new vault with a fresh random master key.
    pub async fn create(
        db: Database,
        passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<Self, CortexError> {
        if Self::exists(&db).await? {
            return Err(CortexError::Vault("vault already exists".to_string()));
        }
        let master_key = Zeroizing::new(crypto::random_bytes::<32>()?);
        let header = VaultHeader::seal(&master_key, passphrase, KdfParams::from(config))?;
        Self::write_header(&db, &header).await?;
        info!("vault created");
        Ok(Self { master_key, db })
    }

    /// Unlock an existing vault. KDF costs come from the stored header.
    pub async fn unlock(db: Database, passphrase: &SecretString) -> Result<Self, CortexError> {
        let header = Self::read_header(&db)
            .await?
            .ok_or_else(|| CortexError::Vault("vault has not been initialized".to_string()))?;
        let master_key = header.unwrap_master_key(passphrase)?;
        debug!("vault unlocked");
        Ok(Self { master_key, db })
    }

    /// Unlock the vault, creating it first when the database has none.
    pub async fn open_or_create(
        db: Database,
        passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<Self, CortexError> {
        if Self::exists(&db).await? {
            Self::unlock(db, passphrase).await
        } else {
            Self::create(db, passphrase, config).await
        }
    }

    /// Re-wrap the master key under a new passphrase.
    pub async fn rotate_passphrase(
        &self,
        new_passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<(), CortexError> {
        let header = VaultHeader::seal(&self.master_key, new_passphrase, KdfParams::from(config))?;
        Self::write_header(&self.db, &header).await?;
        info!("vault passphrase rotated");
        Ok(())
    }

    /// Number of stored secrets.
    pub async fn len(&self) -> Result<u64, CortexError> {
        self.db
            .connection()
            .call(|conn| -> Result<u64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM vault_entries", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn is_empty(&self) -> Result<bool, CortexError> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl SecretStore for Vault {
    async fn put(&self, secret: &SecretString) -> Result<String, CortexError> {
        let sealed = crypto::seal(&self.master_key, secret.expose_secret().as_bytes())?;
        let reference = format!("{CREDENTIAL_PREFIX}{}", uuid::Uuid::new_v4().simple());
        let name = reference.clone();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO vault_entries (name, ciphertext, nonce) VALUES (?1, ?2, ?3)",
                    params![name, sealed.ciphertext, sealed.nonce.to_vec()],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(reference = %reference, "secret stored");
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Option<SecretString>, CortexError> {
        let name = reference.to_string();
        let row = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<(Vec<u8>, Vec<u8>)>, rusqlite::Error> {
                conn.query_row(
                    "SELECT ciphertext, nonce FROM vault_entries WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let Some((ciphertext, nonce)) = row else {
            return Ok(None);
        };
        let sealed = SealedBox {
            ciphertext,
            nonce: nonce.try_into().map_err(|_| corrupted("entry nonce"))?,
        };
        let plaintext = crypto::open(&self.master_key, &sealed)?;
        let value = String::from_utf8(plaintext)
            .map_err(|_| CortexError::Vault("stored secret is not valid UTF-8".to_string()))?;
        Ok(Some(SecretString::from(value)))
    }

    async fn delete(&self, reference: &str) -> Result<(), CortexError> {
        let name = reference.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM vault_entries WHERE name = ?1", params![name])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(reference = %reference, "secret deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> VaultConfig {
        VaultConfig {
            kdf_memory_cost: 32768,
            kdf_iterations: 2,
            kdf_parallelism: 1,
        }
    }

    fn pass(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn secrets_survive_relock() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(!Vault::exists(&db).await.unwrap());

        let vault = Vault::create(db.clone(), &pass("hunter2"), &fast_config())
            .await
            .unwrap();
        let reference = vault.put(&pass("sk-live-123")).await.unwrap();
        assert!(reference.starts_with(CREDENTIAL_PREFIX));
        drop(vault);

        let vault = Vault::unlock(db, &pass("hunter2")).await.unwrap();
        let secret = vault.get(&reference).await.unwrap().unwrap();
        assert_eq!(secret.expose_secret(), "sk-live-123");
    }

    #[tokio::test]
    async fn wrong_passphrase_is_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        Vault::create(db.clone(), &pass("right"), &fast_config())
            .await
            .unwrap();
        let err = Vault::unlock(db, &pass("wrong")).await.unwrap_err();
        assert!(matches!(err, CortexError::Vault(_)));
    }

    #[tokio::test]
    async fn create_twice_fails_but_open_or_create_unlocks() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Vault::open_or_create(db.clone(), &pass("p"), &fast_config())
            .await
            .unwrap();
        let reference = vault.put(&pass("value")).await.unwrap();

        assert!(Vault::create(db.clone(), &pass("p"), &fast_config()).await.is_err());

        let vault = Vault::open_or_create(db, &pass("p"), &fast_config())
            .await
            .unwrap();
        assert!(vault.get(&reference).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Vault::create(db, &pass("p"), &fast_config()).await.unwrap();
        let reference = vault.put(&pass("value")).await.unwrap();
        assert_eq!(vault.len().await.unwrap(), 1);

        vault.delete(&reference).await.unwrap();
        vault.delete(&reference).await.unwrap();
        assert!(vault.get(&reference).await.unwrap().is_none());
        assert!(vault.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn rotation_keeps_existing_secrets() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Vault::create(db.clone(), &pass("old"), &fast_config())
            .await
            .unwrap();
        let reference = vault.put(&pass("kept")).await.unwrap();
        vault
            .rotate_passphrase(&pass("new"), &fast_config())
            .await
            .unwrap();

        assert!(Vault::unlock(db.clone(), &pass("old")).await.is_err());
        let vault = Vault::unlock(db, &pass("new")).await.unwrap();
        assert_eq!(
            vault.get(&reference).await.unwrap().unwrap().expose_secret(),
            "kept"
        );
    }

    #[tokio::test]
    async fn debug_output_is_redacted() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Vault::create(db, &pass("p"), &fast_config()).await.unwrap();
        let rendered = format!("{vault:?}");
        assert!(rendered.contains("[REDACTED]"));
    }
}
