// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API backend. Has no embeddings endpoint.

use std::time::Duration;

use async_trait::async_trait;
use cortex_config::ProviderSettings;
use cortex_core::types::{
    EmbeddingRequest, EmbeddingResponse, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    TokenUsage,
};
use cortex_core::{
    AdapterType, ChatRole, ChunkStream, CortexError, HealthStatus, PluginAdapter, ProviderAdapter,
};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;
use crate::ollama::model_or;
use crate::sse;

const NAME: &str = "anthropic";
const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
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
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    delta: DeltaBody,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    #[serde(default)]
    text: String,
}

/// Client for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Option<reqwest::Client>,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    /// Without an API key the provider still constructs, but every call
    /// fails with [`CortexError::InvalidCredential`] without touching the
    /// network.
    pub fn new(
        settings: &ProviderSettings,
        api_key: Option<&SecretString>,
    ) -> Result<Self, CortexError> {
        let version = settings
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION);
        let client = api_key
            .map(|key| {
                http::build_client(
                    NAME,
                    &[
                        ("x-api-key", key.expose_secret()),
                        ("anthropic-version", version),
                    ],
                    Duration::from_secs(settings.timeout_secs),
                )
            })
            .transpose()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            default_model: settings.default_model.clone(),
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

    fn body<'a>(&'a self, request: &'a ProviderRequest, stream: bool) -> MessagesRequest<'a> {
        MessagesRequest {
            model: model_or(&request.model, &self.default_model),
            max_tokens: request.params.max_tokens,
            // The system prompt is a top-level field; system-role messages are not accepted.
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| WireMessage {
                    role: m.role.as_ref(),
                    content: &m.content,
                })
                .collect(),
            system: request.system_prompt.as_deref(),
            temperature: request.params.temperature.clamp(0.0, 1.0),
            top_p: request.params.top_p,
            stream,
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
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
impl ProviderAdapter for AnthropicProvider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError> {
        let client = self.client()?;
        let response: MessagesResponse = http::send_json(
            NAME,
            client
                .post(format!("{}/v1/messages", self.base_url))
                .json(&self.body(&request, false)),
        )
        .await?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        debug!(model = %response.model, "anthropic generation complete");
        Ok(ProviderResponse {
            content,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }

    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError> {
        let client = self.client()?;
        let response = client
            .post(format!("{}/v1/messages", self.base_url))
            .json(&self.body(&request, true))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;
        let response = http::check_status(NAME, response).await?;

        let stream = sse::events(NAME, response).filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            match event.event.as_str() {
                "content_block_delta" => Some(
                    serde_json::from_str::<BlockDelta>(&event.data)
                        .map(|d| ProviderStreamChunk {
                            text: d.delta.text,
                            done: false,
                        })
                        .map_err(|e| CortexError::Provider {
                            message: format!("malformed content_block_delta: {e}"),
                            source: Some(Box::new(e)),
                        }),
                ),
                "message_stop" => Some(Ok(ProviderStreamChunk {
                    text: String::new(),
                    done: true,
                })),
                "error" => Some(Err(CortexError::unavailable(
                    NAME,
                    format!("stream error: {}", event.data),
                ))),
                // message_start, ping, content_block_start/stop, message_delta
                // and future event types carry no text.
                _ => None,
            }
        });
        Ok(Box::pin(stream))
    }

    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, CortexError> {
        Err(CortexError::provider("anthropic does not provide embeddings"))
    }

    fn supports_embeddings(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use cortex_core::ChatMessage;
    use cortex_core::types::SamplingParams;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(server: &MockServer) -> ProviderSettings {
        ProviderSettings {
            base_url: server.uri(),
            api_key: None,
            default_model: "claude-sonnet-4-20250514".into(),
            api_version: Some("2023-06-01".into()),
            timeout_secs: 5,
        }
    }

    fn provider(server: &MockServer) -> AnthropicProvider {
        let key = SecretString::from("sk-ant-test".to_string());
        AnthropicProvider::new(&settings(server), Some(&key)).unwrap()
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: String::new(),
            system_prompt: Some("You are terse.".into()),
            messages: vec![ChatMessage::user("Hello")],
            params: SamplingParams::default(),
        }
    }

    #[tokio::test]
    async fn generate_sends_headers_and_top_level_system() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "system": "You are terse.",
                "messages": [{"role": "user", "content": "Hello"}],
                "max_tokens": 1024,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hi there!"}],
                "model": "claude-sonnet-4-20250514",
                "usage": {"input_tokens": 10, "output_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server).generate(request()).await.unwrap();
        assert_eq!(response.content, "Hi there!");
        assert_eq!(response.usage.unwrap().input_tokens, 10);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_invalid_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).generate(request()).await.unwrap_err();
        match err {
            CortexError::InvalidCredential { provider, message } => {
                assert_eq!(provider, "anthropic");
                assert!(message.contains("invalid x-api-key"));
            }
            other => panic!("expected InvalidCredential, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overload_is_unavailable_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server).generate(request()).await.unwrap_err();
        assert!(matches!(err, CortexError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn stream_yields_text_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: ping\ndata: {}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" you\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
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
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "Hi you");
        assert!(chunks.last().unwrap().done);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let server = MockServer::start().await;
        let provider = AnthropicProvider::new(&settings(&server), None).unwrap();
        let err = provider.generate(request()).await.unwrap_err();
        assert!(matches!(err, CortexError::InvalidCredential { .. }));
        assert!(!provider.supports_embeddings());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
