// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity recall with always-injected critical memories.
//!
//! 1. Load the tenant's non-expired memories.
//! 2. Split off every memory at or above the importance threshold; these are
//!    returned regardless of similarity or limit.
//! 3. Embed the query through the cache, score the rest by cosine
//!    similarity, keep those at or above `min_similarity`, sort and truncate
//!    to `limit`.
//! 4. Drop similarity hits already present as critical, then return
//!    critical memories first.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use cortex_config::model::MemoryConfig;
use cortex_core::{CortexError, TenantId};
use tracing::{debug, warn};

use crate::cache::EmbeddingCache;
use crate::store::MemoryStore;
use crate::types::{cosine_similarity, Memory, ScoredMemory};

#[derive(Debug, Clone)]
pub struct RecallEngine {
    store: MemoryStore,
    cache: Arc<EmbeddingCache>,
    embedding_model: String,
    high_importance_threshold: f32,
    enabled: bool,
}

/// Higher similarity, then higher importance, then most recently written.
fn rank(a: &ScoredMemory, b: &ScoredMemory) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| by_importance(&a.memory, &b.memory))
}

fn by_importance(a: &Memory, b: &Memory) -> Ordering {
    b.importance
        .total_cmp(&a.importance)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

impl RecallEngine {
    /// Recall is soft-disabled when memory is turned off or the embedding
    /// backend cannot embed.
    pub fn new(store: MemoryStore, cache: Arc<EmbeddingCache>, config: &MemoryConfig) -> Self {
        let enabled = config.enabled && cache.is_available();
        if config.enabled && !enabled {
            warn!(
                provider = %config.embedding_provider,
                "embedding provider has no vector capability, memory recall disabled"
            );
        }
        Self {
            store,
            cache,
            embedding_model: config.embedding_model.clone(),
            high_importance_threshold: config.high_importance_threshold,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Prompt-time recall. Never fails on embedding trouble: if the query
    /// cannot be embedded, only the critical memories are returned.
    pub async fn recall(
        &self,
        tenant: &TenantId,
        query: &str,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, CortexError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        match self.rank_memories(tenant, query, limit, min_similarity).await {
            Err(e) if e.is_retryable() || matches!(e, CortexError::Provider { .. }) => {
                warn!(tenant = %tenant, error = %e, "query embedding failed, recalling critical memories only");
                self.critical_only(tenant).await
            }
            other => other,
        }
    }

    /// Explicit search. Same ranking as [`Self::recall`] but embedding
    /// failures propagate, and a disabled subsystem is an error.
    pub async fn search(
        &self,
        tenant: &TenantId,
        query: &str,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, CortexError> {
        if !self.enabled {
            return Err(CortexError::MemorySubsystemDisabled);
        }
        self.rank_memories(tenant, query, limit, min_similarity).await
    }

    async fn rank_memories(
        &self,
        tenant: &TenantId,
        query: &str,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, CortexError> {
        let memories = self.store.list_active(tenant, Utc::now()).await?;
        if memories.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.cache.get_or_compute(query, &self.embedding_model).await?;

        let (critical, rest): (Vec<Memory>, Vec<Memory>) = memories
            .into_iter()
            .partition(|m| m.importance >= self.high_importance_threshold);
        let critical_ids: HashSet<String> = critical.iter().map(|m| m.id.clone()).collect();

        let mut critical: Vec<ScoredMemory> = critical
            .into_iter()
            .map(|memory| ScoredMemory {
                similarity: cosine_similarity(&query_vector, &memory.embedding),
                memory,
                critical: true,
            })
            .collect();
        critical.sort_by(|a, b| by_importance(&a.memory, &b.memory));

        let mut relevant: Vec<ScoredMemory> = critical
            .iter()
            .cloned()
            .map(|s| ScoredMemory {
                critical: false,
                ..s
            })
            .chain(rest.into_iter().map(|memory| ScoredMemory {
                similarity: cosine_similarity(&query_vector, &memory.embedding),
                memory,
                critical: false,
            }))
            .filter(|s| !s.memory.embedding.is_empty() && s.similarity >= min_similarity)
            .collect();
        relevant.sort_by(rank);
        relevant.truncate(limit);
        relevant.retain(|s| !critical_ids.contains(&s.memory.id));

        debug!(
            tenant = %tenant,
            critical = critical.len(),
            relevant = relevant.len(),
            "memories recalled"
        );
        metrics::counter!("cortex_memory_recalls_total").increment(1);
        critical.extend(relevant);
        Ok(critical)
    }

    async fn critical_only(&self, tenant: &TenantId) -> Result<Vec<ScoredMemory>, CortexError> {
        let memories = self
            .store
            .list_critical(tenant, self.high_importance_threshold, Utc::now())
            .await?;
        Ok(memories
            .into_iter()
            .map(|memory| ScoredMemory {
                memory,
                similarity: 0.0,
                critical: true,
            })
            .collect())
    }
}
