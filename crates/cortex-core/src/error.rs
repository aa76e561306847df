// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cortex engine.

use thiserror::Error;

/// The primary error type used across all Cortex crates.
#[derive(Debug, Error)]
pub enum CortexError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model backend could not be reached or did not answer in time.
    ///
    /// The only retryable variant, and only for idempotent calls such as embeddings.
    #[error("provider `{provider}` unavailable: {message}")]
    ProviderUnavailable {
        provider: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A model backend answered with something we cannot use (bad payload,
    /// unsupported capability, rejected request).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credentials for a provider are missing or were rejected. Never retried.
    #[error("invalid credential for provider `{provider}`: {message}")]
    InvalidCredential { provider: String, message: String },

    /// The memory subsystem is turned off or has no vector capability.
    #[error("memory subsystem is disabled")]
    MemorySubsystemDisabled,

    /// The extraction model produced output that could not be parsed.
    #[error("extraction output could not be parsed: {message}")]
    ExtractionParse { message: String },

    /// The leader kept delegating past the configured depth.
    #[error("delegation depth {depth} exceeded")]
    DelegationLoopExceeded {
        depth: u32,
        /// Last output produced by the leader before the cap was hit.
        partial: String,
    },

    /// Some, but not all, agents failed. Informational; callers receive
    /// per-agent status alongside.
    #[error("{failed} of {total} agents failed")]
    PartialOrchestrationFailure { failed: usize, total: usize },

    /// Every participating agent failed. Carries no partial content.
    #[error("orchestration failed: {message}")]
    OrchestrationFailed { message: String },

    /// A tenant-scoped entity does not exist (or belongs to another tenant).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Caller supplied invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The request was cancelled before completion.
    #[error("request cancelled")]
    Cancelled,

    /// Credential vault errors (encryption, key derivation, locked vault).
    #[error("vault error: {0}")]
    Vault(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CortexError {
    /// Shorthand for a [`CortexError::ProviderUnavailable`] without a source.
    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        CortexError::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`CortexError::Provider`] without a source.
    pub fn provider(message: impl Into<String>) -> Self {
        CortexError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a bounded retry may help. Callers must still restrict retries
    /// to idempotent operations.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CortexError::ProviderUnavailable { .. })
    }

    /// Whether the error should be shown to end users of a chat as-is.
    ///
    /// Only complete orchestration failure qualifies; authentication errors
    /// are raised before the engine is reached. Everything else is logged and
    /// reported as a generic failure by the surrounding service.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, CortexError::OrchestrationFailed { .. })
    }

    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CortexError::Config(_) => "config",
            CortexError::Storage { .. } => "storage",
            CortexError::ProviderUnavailable { .. } => "provider_unavailable",
            CortexError::Provider { .. } => "provider",
            CortexError::InvalidCredential { .. } => "invalid_credential",
            CortexError::MemorySubsystemDisabled => "memory_disabled",
            CortexError::ExtractionParse { .. } => "extraction_parse",
            CortexError::DelegationLoopExceeded { .. } => "delegation_loop_exceeded",
            CortexError::PartialOrchestrationFailure { .. } => "partial_orchestration_failure",
            CortexError::OrchestrationFailed { .. } => "orchestration_failed",
            CortexError::NotFound { .. } => "not_found",
            CortexError::Validation(_) => "validation",
            CortexError::Cancelled => "cancelled",
            CortexError::Vault(_) => "vault",
            CortexError::Internal(_) => "internal",
        }
    }
}
