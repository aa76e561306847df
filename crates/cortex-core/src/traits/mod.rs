// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod provider;
pub mod secret;

pub use adapter::PluginAdapter;
pub use provider::{ChunkStream, ProviderAdapter};
pub use secret::SecretStore;
