// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cortex integration tests.
//!
//! Provides mock adapters so the memory and orchestration layers can be
//! exercised deterministically without a model backend.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted replies, failures, delays and a keyword embedding
//! - [`MemorySecretStore`] - in-memory [`cortex_core::SecretStore`]
//! - [`test_db`] - migrated in-memory database

pub mod mock_provider;
pub mod secret_store;

pub use mock_provider::{keyword_embedding, MockProvider, MockReply};
pub use secret_store::MemorySecretStore;

use cortex_core::CortexError;
use cortex_storage::Database;

/// Open a fresh in-memory database with all migrations applied.
pub async fn test_db() -> Result<Database, CortexError> {
    Database::open_in_memory().await
}
