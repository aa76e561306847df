// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./cortex.toml` > `~/.config/cortex/cortex.toml` > `/etc/cortex/cortex.toml`
//! with environment variable overrides via `CORTEX_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CortexConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cortex/cortex.toml` (system-wide)
/// 3. `~/.config/cortex/cortex.toml` (user XDG config)
/// 4. `./cortex.toml` (local directory)
/// 5. `CORTEX_*` environment variables
pub fn load_config() -> Result<CortexConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CortexConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CortexConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CortexConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CortexConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CortexConfig::default()))
        .merge(Toml::file("/etc/cortex/cortex.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("cortex/cortex.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("cortex.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `CORTEX_SECTION_KEY` onto `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")`: keys such as
/// `CORTEX_EXTRACTION_BATCH_SIZE` must land on `extraction.batch_size`, not
/// `extraction.batch.size`. `CORTEX_VAULT_KEY` is the vault passphrase, not
/// configuration, and is skipped.
fn env_provider() -> Env {
    Env::prefixed("CORTEX_")
        .ignore(&["VAULT_KEY"])
        .map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

/// Known section prefixes of prefix-stripped, lowercased env keys.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("providers_ollama_", "providers.ollama."),
    ("providers_anthropic_", "providers.anthropic."),
    ("providers_openai_", "providers.openai."),
    ("providers_gemini_", "providers.gemini."),
    ("engine_", "engine."),
    ("storage_", "storage."),
    ("memory_", "memory."),
    ("cache_", "cache."),
    ("extraction_", "extraction."),
    ("orchestrator_", "orchestrator."),
    ("sessions_", "sessions."),
    ("retry_", "retry."),
    ("vault_", "vault."),
];

/// Map a prefix-stripped env key to its dotted config path.
fn map_env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}
