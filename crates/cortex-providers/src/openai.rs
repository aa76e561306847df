// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI (and OpenAI-compatible) chat completions and embeddings backend.

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
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::http;
use crate::ollama::model_or;
use crate::retry::RetryPolicy;
use crate::sse;

const NAME: &str = "openai";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    delta: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

/// Client for `/v1/chat/completions` and `/v1/embeddings` with bearer auth.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Option<reqwest::Client>,
    base_url: String,
    default_model: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(
        settings: &ProviderSettings,
        api_key: Option<&SecretString>,
        retry: RetryPolicy,
    ) -> Result<Self, CortexError> {
        let client = api_key
            .map(|key| {
                let bearer = format!("Bearer {}", key.expose_secret());
                http::build_client(
                    NAME,
                    &[("authorization", bearer.as_str())],
                    Duration::from_secs(settings.timeout_secs),
                )
            })
            .transpose()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            default_model: settings.default_model.clone(),
            retry,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn client(&self) -> Result<&reqwest::Client, CortexError> {
        self.client.as_ref().ok_or_else(|| CortexError::InvalidCredential {
            provider: NAME.to_string(),
            message: "no API key configured".to_string(),
        })
    }

    fn body<'a>(&'a self, request: &'a ProviderRequest, stream: bool) -> CompletionRequest<'a> {
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
        CompletionRequest {
            model: model_or(&request.model, &self.default_model),
            messages,
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            stream,
        }
    }

    async fn embed_once(&self, model: &str, input: &str) -> Result<EmbeddingResponse, CortexError> {
        let response: EmbedResponse = http::send_json(
            NAME,
            self.client()?
                .post(format!("{}/v1/embeddings", self.base_url))
                .json(&EmbedRequest { model, input }),
        )
        .await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| EmbeddingResponse { vector: d.embedding })
            .ok_or_else(|| CortexError::provider("openai returned no embedding"))
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
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
        let Ok(client) = self.client() else {
            return Ok(HealthStatus::Unhealthy("no API key configured".to_string()));
        };
        let result = client.get(format!("{}/v1/models", self.base_url)).send().await;
        Ok(match result {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unhealthy(format!("status {}", response.status())),
            Err(e) => HealthStatus::Unhealthy(format!("unreachable: {e}")),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError> {
        let response: CompletionResponse = http::send_json(
            NAME,
            self.client()?
                .post(format!("{}/v1/chat/completions", self.base_url))
                .json(&self.body(&request, false)),
        )
        .await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| CortexError::provider("openai returned no choices"))?;
        Ok(ProviderResponse {
            content,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError> {
        let response = self
            .client()?
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&self.body(&request, true))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;
        let response = http::check_status(NAME, response).await?;

        let stream = sse::events(NAME, response).map(|event| {
            let event = event?;
            if event.data.trim() == DONE_SENTINEL {
                return Ok(ProviderStreamChunk {
                    text: String::new(),
                    done: true,
                });
            }
            let chunk: CompletionResponse =
                serde_json::from_str(&event.data).map_err(|e| CortexError::Provider {
                    message: format!("malformed completion chunk: {e}"),
                    source: Some(Box::new(e)),
                })?;
            let text = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content)
                .unwrap_or_default();
            Ok(ProviderStreamChunk { text, done: false })
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

#[cfg(test)]
mod tests {
    use cortex_core::ChatMessage;
    use cortex_core::types::SamplingParams;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(server: &MockServer) -> OpenAiProvider {
        let settings = ProviderSettings {
            base_url: server.uri(),
            api_key: None,
            default_model: "gpt-4o-mini".into(),
            api_version: None,
            timeout_secs: 5,
        };
        let key = SecretString::from("sk-test".to_string());
        OpenAiProvider::new(
            &settings,
            Some(&key),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
        )
        .unwrap()
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o".into(),
            system_prompt: Some("sys".into()),
            messages: vec![ChatMessage::user("ping")],
            params: SamplingParams::default(),
        }
    }

    #[tokio::test]
    async fn generate_uses_bearer_and_system_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "ping"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
            })))
            .mount(&server)
            .await;

        let response = provider(&server).generate(request()).await.unwrap();
        assert_eq!(response.content, "pong");
        assert_eq!(response.usage.unwrap().input_tokens, 5);
    }

    #[tokio::test]
    async fn stream_stops_at_done_sentinel() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"po\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ng\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let chunks: Vec<_> = provider(&server)
            .generate_stream(request())
            .await
            .unwrap()
            .collect()
            .await;
        let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), "pong");
        assert!(chunks.last().unwrap().done);
    }

    #[tokio::test]
    async fn embed_reads_first_datum() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": "tea"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0, 0.0]}]
            })))
            .mount(&server)
            .await;

        let response = provider(&server)
            .embed(EmbeddingRequest {
                model: "text-embedding-3-small".into(),
                input: "tea".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn embed_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed(EmbeddingRequest {
                model: String::new(),
                input: "tea".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::InvalidCredential { .. }));
    }
}
