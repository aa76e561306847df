// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all adapters implement.

use async_trait::async_trait;

use crate::error::CortexError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Cortex adapters.
///
/// Identity and health reporting shared by every model backend.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Instance name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, CortexError>;

    /// Releases held resources. Most adapters have nothing to do.
    async fn shutdown(&self) -> Result<(), CortexError> {
        Ok(())
    }
}
