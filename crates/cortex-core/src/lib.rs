// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cortex context and orchestration engine.
//!
//! This crate provides the error taxonomy, the provider and secret-store
//! traits, and the common types used throughout the workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::CortexError;
pub use types::{
    AdapterType, AgentRole, ChatMessage, ChatRole, HealthStatus, ProviderKind, TenantId,
};

pub use traits::{ChunkStream, PluginAdapter, ProviderAdapter, SecretStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_unavailable_is_retryable() {
        assert!(CortexError::unavailable("ollama", "connection refused").is_retryable());
        assert!(!CortexError::provider("bad json").is_retryable());
        assert!(
            !CortexError::InvalidCredential {
                provider: "openai".into(),
                message: "401".into(),
            }
            .is_retryable()
        );
        assert!(!CortexError::MemorySubsystemDisabled.is_retryable());
    }

    #[test]
    fn only_complete_failure_is_user_visible() {
        let failed = CortexError::OrchestrationFailed {
            message: "all agents failed".into(),
        };
        assert!(failed.is_user_visible());
        assert!(!CortexError::PartialOrchestrationFailure { failed: 1, total: 3 }.is_user_visible());
        assert!(
            !CortexError::DelegationLoopExceeded {
                depth: 2,
                partial: "draft".into(),
            }
            .is_user_visible()
        );
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(CortexError::Cancelled.kind(), "cancelled");
        assert_eq!(
            CortexError::ExtractionParse {
                message: "eof".into()
            }
            .kind(),
            "extraction_parse"
        );
        assert_eq!(
            CortexError::unavailable("gemini", "timeout").to_string(),
            "provider `gemini` unavailable: timeout"
        );
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_provider_adapter<T: ProviderAdapter>() {}
        fn _assert_secret_store<T: SecretStore>() {}
    }
}
