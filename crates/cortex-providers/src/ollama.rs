// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama backend: `/api/chat` (NDJSON streaming), `/api/embeddings`, `/api/tags`.

use std::time::Duration;

use async_trait::async_trait;
use cortex_config::ProviderSettings;
use cortex_core::types::{
    EmbeddingRequest, EmbeddingResponse, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    TokenUsage,
};
use cortex_core::{
    AdapterType, ChunkStream, CortexError, HealthStatus, PluginAdapter, ProviderAdapter,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;
use crate::retry::RetryPolicy;

const NAME: &str = "ollama";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repeat_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Client for a local or remote Ollama server. Needs no credential.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    retry: RetryPolicy,
}

impl OllamaProvider {
    pub fn new(settings: &ProviderSettings, retry: RetryPolicy) -> Result<Self, CortexError> {
        Ok(Self {
            client: http::build_client(NAME, &[], Duration::from_secs(settings.timeout_secs))?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            default_model: settings.default_model.clone(),
            retry,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn chat_body<'a>(&'a self, request: &'a ProviderRequest, stream: bool) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_ref(),
            content: &m.content,
        }));
        let params = &request.params;
        ChatRequest {
            model: model_or(&request.model, &self.default_model),
            messages,
            stream,
            options: Options {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                top_p: params.top_p,
                repeat_penalty: params.repeat_penalty,
                num_ctx: params.num_ctx,
            },
        }
    }

    async fn embed_once(&self, model: &str, input: &str) -> Result<EmbeddingResponse, CortexError> {
        let body = EmbedRequest {
            model,
            prompt: input,
        };
        let response: EmbedResponse = http::send_json(
            NAME,
            self.client
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&body),
        )
        .await?;
        if response.embedding.is_empty() {
            return Err(CortexError::provider("ollama returned an empty embedding"));
        }
        Ok(EmbeddingResponse {
            vector: response.embedding,
        })
    }
}

pub(crate) fn model_or<'a>(requested: &'a str, default: &'a str) -> &'a str {
    if requested.trim().is_empty() {
        default
    } else {
        requested
    }
}

#[async_trait]
impl PluginAdapter for OllamaProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CortexError> {
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await;
        Ok(match result {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unhealthy(format!("status {}", response.status())),
            Err(e) => HealthStatus::Unhealthy(format!("unreachable: {e}")),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError> {
        let body = self.chat_body(&request, false);
        let chunk: ChatChunk = http::send_json(
            NAME,
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&body),
        )
        .await?;
        if let Some(error) = chunk.error {
            return Err(CortexError::provider(format!("ollama: {error}")));
        }
        debug!(model = %chunk.model, "ollama generation complete");
        let usage = match (chunk.prompt_eval_count, chunk.eval_count) {
            (Some(input), Some(output)) => Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
            }),
            _ => None,
        };
        Ok(ProviderResponse {
            content: chunk.message.map(|m| m.content).unwrap_or_default(),
            model: chunk.model,
            usage,
        })
    }

    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError> {
        let body = self.chat_body(&request, true);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;
        let response = http::check_status(NAME, response).await?;

        let stream = http::ndjson_lines(NAME, response).map(|line| {
            let line = line?;
            let chunk: ChatChunk = serde_json::from_str(&line).map_err(|e| CortexError::Provider {
                message: format!("ollama sent a malformed stream record: {e}"),
                source: Some(Box::new(e)),
            })?;
            if let Some(error) = chunk.error {
                return Err(CortexError::provider(format!("ollama: {error}")));
            }
            Ok(ProviderStreamChunk {
                text: chunk.message.map(|m| m.content).unwrap_or_default(),
                done: chunk.done,
            })
        });
        Ok(Box::pin(stream))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, CortexError> {
        let model = model_or(&request.model, &self.default_model);
        self.retry
            .run(NAME, || self.embed_once(model, &request.input))
            .await
    }
}
