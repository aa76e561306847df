// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Cortex workspace.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Identity of the tenant (application) that owns memories, agents and turns.
///
/// Constructed by the authenticating collaborator and passed explicitly
/// through every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Health status reported by adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
}

/// The closed set of model backends the engine can talk to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Anthropic,
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// Remote providers refuse requests without an API key.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

/// Role an agent plays in orchestration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Leader,
    Coder,
    Reviewer,
    Researcher,
}

impl AgentRole {
    /// Position in the default chain: researcher, coder, reviewer, then leader.
    pub fn chain_rank(&self) -> u8 {
        match self {
            AgentRole::Researcher => 0,
            AgentRole::Coder => 1,
            AgentRole::Reviewer => 2,
            AgentRole::Leader => 3,
        }
    }
}

/// Speaker of a chat message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Honoured by backends that support it (Ollama).
    #[serde(default)]
    pub repeat_penalty: Option<f32>,
    /// Context window hint (Ollama `num_ctx`).
    #[serde(default)]
    pub num_ctx: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            top_p: None,
            repeat_penalty: None,
            num_ctx: None,
        }
    }
}

/// A request to generate text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Model identifier as understood by the backend.
    pub model: String,
    /// System prompt, passed in whatever slot the backend expects.
    pub system_prompt: Option<String>,
    /// Conversation so far, ending with the message to answer.
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
}

/// Token usage reported by a backend, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// An incremental piece of a streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStreamChunk {
    /// Text delta; empty for bookkeeping-only chunks.
    pub text: String,
    /// Set on the final chunk of the stream.
    pub done: bool,
}

/// A request to embed a single piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

/// An embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResponse {
    pub vector: Vec<f32>,
}
