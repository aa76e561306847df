// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single capability interface every model backend exposes.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::CortexError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    EmbeddingRequest, EmbeddingResponse, ProviderRequest, ProviderResponse, ProviderStreamChunk,
};

/// Boxed stream of generation chunks.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, CortexError>> + Send>>;

/// Adapter for language-model backends.
///
/// `health_check` comes from [`PluginAdapter`]. Implementations never retry
/// `generate`/`generate_stream`; `embed` may retry with bounded backoff.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Generates a complete response.
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, CortexError>;

    /// Generates a response as a stream of text deltas.
    async fn generate_stream(&self, request: ProviderRequest) -> Result<ChunkStream, CortexError>;

    /// Embeds one text into a vector.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, CortexError>;

    /// Whether [`ProviderAdapter::embed`] is supported at all.
    fn supports_embeddings(&self) -> bool {
        true
    }
}
