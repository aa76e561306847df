// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cortex engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Cortex configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CortexConfig {
    /// Engine identity and request defaults.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Memory recall settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Embedding cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Memory extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Multi-agent orchestration settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Conversation session settings.
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Retry policy for idempotent provider calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Model backend endpoints.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Credential vault settings.
    #[serde(default)]
    pub vault: VaultConfig,
}

/// Engine identity and request defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Display name used in logs.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Strategy used when a chat request does not name one.
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Response style preset used when a chat request does not name one.
    #[serde(default = "default_style")]
    pub default_style: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
            default_strategy: default_strategy(),
            default_style: default_style(),
        }
    }
}

fn default_engine_name() -> String {
    "cortex".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_strategy() -> String {
    "single".to_string()
}

fn default_style() -> String {
    "default".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable SQLite WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    "cortex.db".to_string()
}

fn default_true() -> bool {
    true
}

/// Memory recall configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Whether the memory subsystem is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider used for embeddings (`ollama`, `openai`, `gemini`).
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Maximum similarity results injected per request.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Similarity floor for recall (cosine, 0.0-1.0).
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Memories at or above this importance are always injected.
    #[serde(default = "default_high_importance_threshold")]
    pub high_importance_threshold: f32,

    /// Interval between expired-memory purges, in seconds.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            recall_limit: default_recall_limit(),
            min_similarity: default_min_similarity(),
            high_importance_threshold: default_high_importance_threshold(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_recall_limit() -> usize {
    5
}

fn default_min_similarity() -> f32 {
    0.5
}

fn default_high_importance_threshold() -> f32 {
    0.9
}

fn default_purge_interval_secs() -> u64 {
    3600
}

/// Embedding cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of cached vectors.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Time-to-live of a cached vector, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

/// When extraction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Right after each assistant reply, in the background.
    Inline,
    /// From the durable queue, on an interval or admin trigger.
    Batch,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Inline => "inline",
            ExtractionMode::Batch => "batch",
        }
    }
}

/// Memory extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Whether conversation turns are mined for memories.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Inline or batch processing.
    #[serde(default = "default_extraction_mode")]
    pub mode: ExtractionMode,

    /// Provider running the extraction model.
    #[serde(default = "default_extraction_provider")]
    pub provider: String,

    /// Extraction model identifier.
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// Maximum turns consumed per batch run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between scheduled batch runs.
    #[serde(default = "default_extraction_interval_secs")]
    pub interval_secs: u64,

    /// Prior session messages sent along with the turns being extracted.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Attempts before a turn that keeps hitting provider outages is failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sampling temperature for the extraction call.
    #[serde(default = "default_extraction_temperature")]
    pub temperature: f32,

    /// Token budget for the extraction call.
    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,

    /// User content shorter than this is not worth extracting.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: default_extraction_mode(),
            provider: default_extraction_provider(),
            model: default_extraction_model(),
            batch_size: default_batch_size(),
            interval_secs: default_extraction_interval_secs(),
            context_window: default_context_window(),
            max_attempts: default_max_attempts(),
            temperature: default_extraction_temperature(),
            max_tokens: default_extraction_max_tokens(),
            min_content_chars: default_min_content_chars(),
        }
    }
}

fn default_extraction_mode() -> ExtractionMode {
    ExtractionMode::Batch
}

fn default_extraction_provider() -> String {
    "ollama".to_string()
}

fn default_extraction_model() -> String {
    "llama3.2".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_extraction_interval_secs() -> u64 {
    300
}

fn default_context_window() -> usize {
    6
}

fn default_max_attempts() -> u32 {
    3
}

fn default_extraction_temperature() -> f32 {
    0.1
}

fn default_extraction_max_tokens() -> u32 {
    2048
}

fn default_min_content_chars() -> usize {
    10
}

/// Multi-agent orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// How many times a leader may delegate within one request.
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,

    /// Upper bound on simultaneous agent calls per tenant.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls_per_tenant: usize,

    /// Deadline for a single agent call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Characters of each specialist's system prompt shown in the leader manifest.
    #[serde(default = "default_manifest_prompt_chars")]
    pub manifest_prompt_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: default_max_delegation_depth(),
            max_concurrent_calls_per_tenant: default_max_concurrent_calls(),
            call_timeout_secs: default_call_timeout_secs(),
            manifest_prompt_chars: default_manifest_prompt_chars(),
        }
    }
}

fn default_max_delegation_depth() -> u32 {
    2
}

fn default_max_concurrent_calls() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_manifest_prompt_chars() -> usize {
    100
}

/// Conversation session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Messages kept per session and replayed to agents.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Idle sessions older than this are dropped by the sweep.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

fn default_max_history() -> usize {
    20
}

fn default_idle_ttl_secs() -> u64 {
    3600
}

/// Bounded exponential backoff for idempotent provider calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

/// Endpoints for every supported model backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default = "default_ollama")]
    pub ollama: ProviderSettings,

    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderSettings,

    #[serde(default = "default_openai")]
    pub openai: ProviderSettings,

    #[serde(default = "default_gemini")]
    pub gemini: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ollama: default_ollama(),
            anthropic: default_anthropic(),
            openai: default_openai(),
            gemini: default_gemini(),
        }
    }
}

impl ProvidersConfig {
    /// Looks up settings by provider name (`ollama`, `anthropic`, `openai`, `gemini`).
    pub fn get(&self, name: &str) -> Option<&ProviderSettings> {
        match name.to_ascii_lowercase().as_str() {
            "ollama" => Some(&self.ollama),
            "anthropic" => Some(&self.anthropic),
            "openai" => Some(&self.openai),
            "gemini" => Some(&self.gemini),
            _ => None,
        }
    }
}

/// Connection settings for one backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Base URL of the API.
    pub base_url: String,

    /// API key used by engine-owned clients (extraction, embeddings).
    /// Agents carry their own credentials in the vault.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used when a caller does not name one.
    pub default_model: String,

    /// API version header (Anthropic only).
    #[serde(default)]
    pub api_version: Option<String>,

    /// HTTP timeout per request, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_ollama() -> ProviderSettings {
    ProviderSettings {
        base_url: "http://localhost:11434".to_string(),
        api_key: None,
        default_model: "llama3.2".to_string(),
        api_version: None,
        timeout_secs: default_provider_timeout_secs(),
    }
}

fn default_anthropic() -> ProviderSettings {
    ProviderSettings {
        base_url: "https://api.anthropic.com".to_string(),
        api_key: None,
        default_model: "claude-sonnet-4-20250514".to_string(),
        api_version: Some("2023-06-01".to_string()),
        timeout_secs: default_provider_timeout_secs(),
    }
}

fn default_openai() -> ProviderSettings {
    ProviderSettings {
        base_url: "https://api.openai.com".to_string(),
        api_key: None,
        default_model: "gpt-4o-mini".to_string(),
        api_version: None,
        timeout_secs: default_provider_timeout_secs(),
    }
}

fn default_gemini() -> ProviderSettings {
    ProviderSettings {
        base_url: "https://generativelanguage.googleapis.com".to_string(),
        api_key: None,
        default_model: "gemini-1.5-flash".to_string(),
        api_version: None,
        timeout_secs: default_provider_timeout_secs(),
    }
}

/// Credential vault configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Argon2id memory cost in KiB.
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism degree.
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}
