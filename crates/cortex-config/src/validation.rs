// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers the constraints serde attributes cannot express: ranges, known
//! provider and strategy names, and cross-field relations.

use crate::diagnostic::ConfigError;
use crate::model::CortexConfig;

/// Providers the engine can build a client for.
pub const KNOWN_PROVIDERS: &[&str] = &["ollama", "anthropic", "openai", "gemini"];

/// Providers able to produce embeddings.
pub const EMBEDDING_PROVIDERS: &[&str] = &["ollama", "openai", "gemini"];

/// Orchestration strategies accepted as `engine.default_strategy`.
pub const KNOWN_STRATEGIES: &[&str] = &["single", "leader", "parallel", "chain"];

/// Response style presets accepted as `engine.default_style`.
pub const KNOWN_STYLES: &[&str] = &["default", "brief", "detailed", "technical", "creative"];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation rather than stopping at the first.
pub fn validate_config(config: &CortexConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, message: String| {
        if !ok {
            errors.push(ConfigError::validation(message));
        }
    };

    let engine = &config.engine;
    check(
        LOG_LEVELS.contains(&engine.log_level.to_ascii_lowercase().as_str()),
        format!(
            "engine.log_level `{}` must be one of {}",
            engine.log_level,
            LOG_LEVELS.join(", ")
        ),
    );
    check(
        KNOWN_STRATEGIES.contains(&engine.default_strategy.as_str()),
        format!(
            "engine.default_strategy `{}` must be one of {}",
            engine.default_strategy,
            KNOWN_STRATEGIES.join(", ")
        ),
    );
    check(
        KNOWN_STYLES.contains(&engine.default_style.as_str()),
        format!(
            "engine.default_style `{}` must be one of {}",
            engine.default_style,
            KNOWN_STYLES.join(", ")
        ),
    );

    check(
        !config.storage.database_path.trim().is_empty(),
        "storage.database_path must not be empty".to_string(),
    );

    let memory = &config.memory;
    check(
        in_unit_range(memory.min_similarity),
        format!(
            "memory.min_similarity must be within 0.0..=1.0, got {}",
            memory.min_similarity
        ),
    );
    check(
        in_unit_range(memory.high_importance_threshold),
        format!(
            "memory.high_importance_threshold must be within 0.0..=1.0, got {}",
            memory.high_importance_threshold
        ),
    );
    check(
        memory.recall_limit > 0,
        "memory.recall_limit must be greater than 0".to_string(),
    );
    check(
        EMBEDDING_PROVIDERS.contains(&memory.embedding_provider.to_ascii_lowercase().as_str()),
        format!(
            "memory.embedding_provider `{}` cannot produce embeddings (use one of {})",
            memory.embedding_provider,
            EMBEDDING_PROVIDERS.join(", ")
        ),
    );

    check(
        config.cache.capacity > 0,
        "cache.capacity must be greater than 0".to_string(),
    );
    check(
        config.cache.ttl_secs > 0,
        "cache.ttl_secs must be greater than 0".to_string(),
    );

    let extraction = &config.extraction;
    check(
        extraction.batch_size > 0,
        "extraction.batch_size must be greater than 0".to_string(),
    );
    check(
        extraction.max_attempts > 0,
        "extraction.max_attempts must be at least 1".to_string(),
    );
    check(
        KNOWN_PROVIDERS.contains(&extraction.provider.to_ascii_lowercase().as_str()),
        format!(
            "extraction.provider `{}` must be one of {}",
            extraction.provider,
            KNOWN_PROVIDERS.join(", ")
        ),
    );
    check(
        (0.0..=2.0).contains(&extraction.temperature),
        format!(
            "extraction.temperature must be within 0.0..=2.0, got {}",
            extraction.temperature
        ),
    );

    let orchestrator = &config.orchestrator;
    check(
        orchestrator.max_concurrent_calls_per_tenant > 0,
        "orchestrator.max_concurrent_calls_per_tenant must be greater than 0".to_string(),
    );
    check(
        orchestrator.call_timeout_secs > 0,
        "orchestrator.call_timeout_secs must be greater than 0".to_string(),
    );

    check(
        config.sessions.max_history > 0,
        "sessions.max_history must be greater than 0".to_string(),
    );

    let retry = &config.retry;
    check(
        retry.max_attempts >= 1,
        "retry.max_attempts must be at least 1".to_string(),
    );
    check(
        retry.initial_backoff_ms <= retry.max_backoff_ms,
        format!(
            "retry.initial_backoff_ms ({}) must not exceed retry.max_backoff_ms ({})",
            retry.initial_backoff_ms, retry.max_backoff_ms
        ),
    );

    for name in KNOWN_PROVIDERS {
        if let Some(settings) = config.providers.get(name) {
            check(
                !settings.base_url.trim().is_empty(),
                format!("providers.{name}.base_url must not be empty"),
            );
            check(
                settings.timeout_secs > 0,
                format!("providers.{name}.timeout_secs must be greater than 0"),
            );
        }
    }

    let vault = &config.vault;
    check(
        vault.kdf_memory_cost >= 32768,
        format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            vault.kdf_memory_cost
        ),
    );
    check(
        vault.kdf_iterations >= 2,
        format!(
            "vault.kdf_iterations must be at least 2, got {}",
            vault.kdf_iterations
        ),
    );
    check(
        vault.kdf_parallelism >= 1,
        format!(
            "vault.kdf_parallelism must be at least 1, got {}",
            vault.kdf_parallelism
        ),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn in_unit_range(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(validate_config(&CortexConfig::default()).is_ok());
    }

    #[test]
    fn anthropic_cannot_embed() {
        let mut config = CortexConfig::default();
        config.memory.embedding_provider = "anthropic".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("embedding_provider"));
    }

    #[test]
    fn nan_similarity_is_rejected() {
        let mut config = CortexConfig::default();
        config.memory.min_similarity = f32::NAN;
        assert!(validate_config(&config).is_err());
    }
}
