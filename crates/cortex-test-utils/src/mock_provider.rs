// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model backend for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with a FIFO queue of scripted
//! replies, optional latency, injectable embedding failures and a keyword
//! bag-of-words embedding, so similarity in tests is predictable.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cortex_core::types::{
    EmbeddingRequest, EmbeddingResponse, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    TokenUsage,
};
use cortex_core::{
    AdapterType, ChunkStream, CortexError, HealthStatus, PluginAdapter, ProviderAdapter,
};
use futures::stream;
use sha2::{Digest, Sha256};

/// Dimension of the keyword embedding.
pub const KEYWORD_DIMS: usize = 32;

/// One scripted outcome of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    /// Fails with `ProviderUnavailable`.
    Unavailable,
    /// Fails with `InvalidCredential`.
    InvalidCredential,
}

impl From<&str> for MockReply {
    fn from(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }
}

/// A scripted model backend.
///
/// Replies are popped from a FIFO queue; when it is empty the default reply
/// (`"mock response"`) is returned.
pub struct MockProvider {
    name: String,
    replies: Mutex<VecDeque<MockReply>>,
    default_reply: MockReply,
    delay: Option<Duration>,
    embeddings: HashMap<String, Vec<f32>>,
    embeddings_supported: bool,
    embed_failures: AtomicUsize,
    generate_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            default_reply: MockReply::Text("mock response".to_string()),
            delay: None,
            embeddings: HashMap::new(),
            embeddings_supported: true,
            embed_failures: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies in order.
    pub fn with_replies<R: Into<MockReply>>(self, replies: impl IntoIterator<Item = R>) -> Self {
        lock(&self.replies).extend(replies.into_iter().map(Into::into));
        self
    }

    /// Reply used once the queue is exhausted.
    pub fn with_default_reply(mut self, reply: impl Into<MockReply>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pin the embedding of an exact input text.
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.embeddings.insert(text.into(), vector);
        self
    }

    /// Report no embedding capability; `embed` fails with a provider error.
    pub fn without_embeddings(mut self) -> Self {
        self.embeddings_supported = false;
        self
    }

    /// The next `n` embed calls fail with `ProviderUnavailable`.
    pub fn fail_next_embeddings(&self, n: usize) {
        self.embed_failures.store(n, Ordering::SeqCst);
    }

    pub fn push_reply(&self, reply: impl Into<MockReply>) {
        lock(&self.replies).push_back(reply.into());
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Every generation request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        lock(&self.requests).last().cloned()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn next_reply(&self, request: ProviderRequest) -> Result<String, CortexError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request);
        self.pause().await;
        let reply = lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Unavailable => Err(CortexError::unavailable(
                self.name.clone(),
                "scripted outage",
            )),
            MockReply::InvalidCredential => Err(CortexError::InvalidCredential {
                provider: self.name.clone(),
                message: "scripted rejection".to_string(),
            }),
        }
    }
}

/// Deterministic bag-of-words embedding: each lowercase word is hashed into
/// one of [`KEYWORD_DIMS`] buckets and the result is L2-normalized. Texts
/// sharing words are similar; texts sharing none are orthogonal unless their
/// words collide.
pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; KEYWORD_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let digest = Sha256::digest(word.to_lowercase().as_bytes());
        vector[usize::from(digest[0]) % KEYWORD_DIMS] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CortexError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError> {
        let model = request.model.clone();
        let content = self.next_reply(request).await?;
        Ok(ProviderResponse {
            content,
            model,
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            }),
        })
    }

    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError> {
        let text = self.next_reply(request).await?;
        let mut chunks: Vec<Result<ProviderStreamChunk, CortexError>> = text
            .split_inclusive(' ')
            .map(|piece| {
                Ok(ProviderStreamChunk {
                    text: piece.to_string(),
                    done: false,
                })
            })
            .collect();
        chunks.push(Ok(ProviderStreamChunk {
            text: String::new(),
            done: true,
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, CortexError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if !self.embeddings_supported {
            return Err(CortexError::provider(format!(
                "{} does not support embeddings",
                self.name
            )));
        }
        let failing = self
            .embed_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CortexError::unavailable(self.name.clone(), "scripted outage"));
        }
        let vector = self
            .embeddings
            .get(&request.input)
            .cloned()
            .unwrap_or_else(|| keyword_embedding(&request.input));
        Ok(EmbeddingResponse { vector })
    }

    fn supports_embeddings(&self) -> bool {
        self.embeddings_supported
    }
}
