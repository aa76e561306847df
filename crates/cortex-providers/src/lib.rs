// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model backend clients for the Cortex engine.
//!
//! Every backend implements [`ProviderAdapter`]; the closed [`Provider`] enum
//! is what the rest of the workspace holds, so adding a backend is a matter
//! of adding a variant and a match arm.

mod http;
mod sse;

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod retry;

use async_trait::async_trait;
use cortex_config::ProviderSettings;
use cortex_core::types::{EmbeddingRequest, EmbeddingResponse, ProviderRequest, ProviderResponse};
use cortex_core::{
    AdapterType, ChunkStream, CortexError, HealthStatus, PluginAdapter, ProviderAdapter,
    ProviderKind,
};
use secrecy::SecretString;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use retry::RetryPolicy;

/// One of the supported model backends.
#[derive(Debug, Clone)]
pub enum Provider {
    Ollama(OllamaProvider),
    Anthropic(AnthropicProvider),
    OpenAi(OpenAiProvider),
    Gemini(GeminiProvider),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            Provider::Ollama($p) => $body,
            Provider::Anthropic($p) => $body,
            Provider::OpenAi($p) => $body,
            Provider::Gemini($p) => $body,
        }
    };
}

impl Provider {
    /// Build a client for `kind`. Remote providers construct without a key
    /// but then fail every call with [`CortexError::InvalidCredential`].
    pub fn from_settings(
        kind: ProviderKind,
        settings: &ProviderSettings,
        api_key: Option<SecretString>,
        retry: RetryPolicy,
    ) -> Result<Self, CortexError> {
        let key = api_key.as_ref();
        Ok(match kind {
            ProviderKind::Ollama => Provider::Ollama(OllamaProvider::new(settings, retry)?),
            ProviderKind::Anthropic => {
                Provider::Anthropic(AnthropicProvider::new(settings, key)?)
            }
            ProviderKind::OpenAi => Provider::OpenAi(OpenAiProvider::new(settings, key, retry)?),
            ProviderKind::Gemini => Provider::Gemini(GeminiProvider::new(settings, key, retry)?),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Ollama(_) => ProviderKind::Ollama,
            Provider::Anthropic(_) => ProviderKind::Anthropic,
            Provider::OpenAi(_) => ProviderKind::OpenAi,
            Provider::Gemini(_) => ProviderKind::Gemini,
        }
    }

    pub fn default_model(&self) -> &str {
        dispatch!(self, p => p.default_model())
    }
}

#[async_trait]
impl PluginAdapter for Provider {
    fn name(&self) -> &str {
        dispatch!(self, p => p.name())
    }

    fn version(&self) -> semver::Version {
        dispatch!(self, p => p.version())
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CortexError> {
        dispatch!(self, p => p.health_check().await)
    }
}

#[async_trait]
impl ProviderAdapter for Provider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError> {
        dispatch!(self, p => p.generate(request).await)
    }

    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError> {
        dispatch!(self, p => p.generate_stream(request).await)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, CortexError> {
        dispatch!(self, p => p.embed(request).await)
    }

    fn supports_embeddings(&self) -> bool {
        dispatch!(self, p => p.supports_embeddings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> ProviderSettings {
        ProviderSettings {
            base_url: base_url.into(),
            api_key: None,
            default_model: "m".into(),
            api_version: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn kind_round_trips_through_factory() {
        for kind in [
            ProviderKind::Ollama,
            ProviderKind::Anthropic,
            ProviderKind::OpenAi,
            ProviderKind::Gemini,
        ] {
            let provider = Provider::from_settings(
                kind,
                &settings("http://localhost:1"),
                Some(SecretString::from("k".to_string())),
                RetryPolicy::none(),
            )
            .unwrap();
            assert_eq!(provider.kind(), kind);
            assert_eq!(provider.name(), kind.as_ref());
            assert_eq!(provider.default_model(), "m");
        }
    }

    #[test]
    fn only_anthropic_lacks_embeddings() {
        let anthropic = Provider::from_settings(
            ProviderKind::Anthropic,
            &settings("http://localhost:1"),
            None,
            RetryPolicy::none(),
        )
        .unwrap();
        assert!(!anthropic.supports_embeddings());
        let ollama = Provider::from_settings(
            ProviderKind::Ollama,
            &settings("http://localhost:1"),
            None,
            RetryPolicy::none(),
        )
        .unwrap();
        assert!(ollama.supports_embeddings());
    }
}
