// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini (`generativelanguage`) backend.
//!
//! The API key travels in the `x-goog-api-key` header rather than the URL so
//! it never appears in request logs.

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
use futures::{stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::http;
use crate::ollama::model_or;
use crate::retry::RetryPolicy;
use crate::sse;

const NAME: &str = "gemini";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    content: Content<'a>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

/// Client for `generateContent`, `streamGenerateContent` and `embedContent`.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Option<reqwest::Client>,
    base_url: String,
    default_model: String,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(
        settings: &ProviderSettings,
        api_key: Option<&SecretString>,
        retry: RetryPolicy,
    ) -> Result<Self, CortexError> {
        let client = api_key
            .map(|key| {
                http::build_client(
                    NAME,
                    &[("x-goog-api-key", key.expose_secret())],
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

    fn url(&self, model: &str, action: &str) -> String {
        format!("{}/v1beta/models/{model}:{action}", self.base_url)
    }

    fn body<'a>(request: &'a ProviderRequest) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: request
                .messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| Content {
                    role: Some(match m.role {
                        ChatRole::Assistant => "model",
                        _ => "user",
                    }),
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            system_instruction: request.system_prompt.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: request.params.temperature,
                max_output_tokens: request.params.max_tokens,
                top_p: request.params.top_p,
            },
        }
    }

    async fn embed_once(&self, model: &str, input: &str) -> Result<EmbeddingResponse, CortexError> {
        let body = EmbedRequest {
            content: Content {
                role: None,
                parts: vec![Part { text: input }],
            },
        };
        let response: EmbedResponse = http::send_json(
            NAME,
            self.client()?
                .post(self.url(model, "embedContent"))
                .json(&body),
        )
        .await?;
        Ok(EmbeddingResponse {
            vector: response.embedding.values,
        })
    }
}

#[async_trait]
impl PluginAdapter for GeminiProvider {
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
        let result = client
            .get(format!("{}/v1beta/models", self.base_url))
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
impl ProviderAdapter for GeminiProvider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError> {
        let model = model_or(&request.model, &self.default_model);
        let response: GenerateResponse = http::send_json(
            NAME,
            self.client()?
                .post(self.url(model, "generateContent"))
                .json(&Self::body(&request)),
        )
        .await?;
        Ok(ProviderResponse {
            content: response.text(),
            model: response
                .model_version
                .clone()
                .unwrap_or_else(|| model.to_string()),
            usage: response.usage_metadata.map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
        })
    }

    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError> {
        let model = model_or(&request.model, &self.default_model);
        let response = self
            .client()?
            .post(format!("{}?alt=sse", self.url(model, "streamGenerateContent")))
            .json(&Self::body(&request))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;
        let response = http::check_status(NAME, response).await?;

        // The stream simply ends; emit an explicit terminal chunk.
        let stream = sse::events(NAME, response)
            .map(|event| {
                let event = event?;
                let chunk: GenerateResponse =
                    serde_json::from_str(&event.data).map_err(|e| CortexError::Provider {
                        message: format!("malformed gemini stream chunk: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                Ok(ProviderStreamChunk {
                    text: chunk.text(),
                    done: false,
                })
            })
            .chain(stream::once(async {
                Ok(ProviderStreamChunk {
                    text: String::new(),
                    done: true,
                })
            }));
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
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(server: &MockServer) -> GeminiProvider {
        let settings = ProviderSettings {
            base_url: server.uri(),
            api_key: None,
            default_model: "gemini-1.5-flash".into(),
            api_version: None,
            timeout_secs: 5,
        };
        let key = SecretString::from("g-key".to_string());
        GeminiProvider::new(&settings, Some(&key), RetryPolicy::none()).unwrap()
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: String::new(),
            system_prompt: Some("be kind".into()),
            messages: vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::user("how are you"),
            ],
            params: SamplingParams::default(),
        }
    }

    #[tokio::test]
    async fn generate_maps_roles_and_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "be kind"}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]},
                    {"role": "user", "parts": [{"text": "how are you"}]}
                ],
                "generationConfig": {"maxOutputTokens": 1024}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "fine"}]}}],
                "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 1}
            })))
            .mount(&server)
            .await;

        let response = provider(&server).generate(request()).await.unwrap();
        assert_eq!(response.content, "fine");
        assert_eq!(response.model, "gemini-1.5-flash");
        assert_eq!(response.usage.unwrap().input_tokens, 7);
    }

    #[tokio::test]
    async fn stream_uses_sse_and_terminates() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"fi\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ne\"}]}}]}\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
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
        assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), "fine");
        assert!(chunks.last().unwrap().done);
    }

    #[tokio::test]
    async fn embed_reads_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-embedding-004:embedContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": {"values": [0.5, 0.5]}
            })))
            .mount(&server)
            .await;

        let response = provider(&server)
            .embed(EmbeddingRequest {
                model: "text-embedding-004".into(),
                input: "x".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.vector, vec![0.5, 0.5]);
    }
}
