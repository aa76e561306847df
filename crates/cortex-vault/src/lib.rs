// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM encrypted credential vault for the Cortex engine.
//!
//! Agent API keys are sealed under a random master key; the master key is
//! itself sealed under a key derived from the operator passphrase with
//! Argon2id. Callers only ever see opaque `cred_<uuid>` references.

pub mod crypto;
pub mod kdf;
pub mod prompt;
pub mod vault;

pub use prompt::{read_passphrase, VAULT_KEY_ENV_VAR};
pub use vault::{Vault, CREDENTIAL_PREFIX};
