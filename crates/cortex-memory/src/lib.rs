// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory for the Cortex engine.
//!
//! ## Architecture
//!
//! - **EmbeddingCache**: process-wide LRU+TTL cache with request coalescing
//! - **MemoryStore**: SQLite persistence with BLOB vectors, tenant-scoped
//! - **RecallEngine**: cosine top-K plus always-injected critical memories
//! - **ExtractionPipeline**: model-driven fact extraction from queued turns
//! - **MemoryManager**: remember / recall / search / clear facade
//! - **context**: prompt rendering of recalled memories

pub mod cache;
pub mod context;
pub mod extractor;
pub mod manager;
pub mod retriever;
pub mod store;
pub mod types;

pub use cache::{CacheStats, EmbeddingCache};
pub use context::{augment_system_prompt, format_memory_context};
pub use extractor::{ExtractionPipeline, ExtractionReport, ExtractionStatus};
pub use manager::{MemoryInput, MemoryManager, StoredMemory};
pub use retriever::RecallEngine;
pub use store::MemoryStore;
pub use types::*;
