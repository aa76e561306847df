// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-facing memory operations: remember, recall, search and clear.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cortex_config::model::MemoryConfig;
use cortex_core::{CortexError, TenantId};
use cortex_storage::Database;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{CacheStats, EmbeddingCache};
use crate::retriever::RecallEngine;
use crate::store::MemoryStore;
use crate::types::{MemoryType, NewMemory, ScoredMemory, UpsertOutcome};

/// A memory supplied directly by a caller rather than extracted.
///
/// Without an explicit tuple the memory is keyed as
/// `(user, noted, <content>)`, so storing the same sentence twice updates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInput {
    pub content: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default = "default_memory_type")]
    pub memory_type: MemoryType,
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_memory_type() -> MemoryType {
    MemoryType::Fact
}

fn default_importance() -> f32 {
    crate::types::DEFAULT_IMPORTANCE
}

impl MemoryInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            subject: None,
            predicate: None,
            object: None,
            memory_type: MemoryType::Fact,
            importance: default_importance(),
            tags: Vec::new(),
            session_id: None,
            expires_at: None,
        }
    }
}

/// Identity and outcome of a [`MemoryManager::remember`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMemory {
    pub id: String,
    pub outcome: UpsertOutcome,
}

#[derive(Debug, Clone)]
pub struct MemoryManager {
    store: MemoryStore,
    cache: Arc<EmbeddingCache>,
    recall: RecallEngine,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(db: Database, cache: Arc<EmbeddingCache>, config: MemoryConfig) -> Self {
        let store = MemoryStore::new(db);
        let recall = RecallEngine::new(store.clone(), Arc::clone(&cache), &config);
        Self {
            store,
            cache,
            recall,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.recall.is_enabled()
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Prompt-time recall with the configured limit and similarity floor.
    pub async fn recall(
        &self,
        tenant: &TenantId,
        query: &str,
    ) -> Result<Vec<ScoredMemory>, CortexError> {
        self.recall
            .recall(tenant, query, self.config.recall_limit, self.config.min_similarity)
            .await
    }

    pub async fn search(
        &self,
        tenant: &TenantId,
        query: &str,
        limit: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, CortexError> {
        if query.trim().is_empty() {
            return Err(CortexError::Validation("search query is empty".to_string()));
        }
        self.recall
            .search(
                tenant,
                query,
                limit.unwrap_or(self.config.recall_limit),
                min_similarity.unwrap_or(self.config.min_similarity),
            )
            .await
    }

    pub async fn remember(
        &self,
        tenant: &TenantId,
        input: MemoryInput,
    ) -> Result<StoredMemory, CortexError> {
        if !self.is_enabled() {
            return Err(CortexError::MemorySubsystemDisabled);
        }
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(CortexError::Validation("memory content is empty".to_string()));
        }
        let vector = self
            .cache
            .get_or_compute(&content, &self.config.embedding_model)
            .await?;
        let mut memory = NewMemory::fact(
            tenant.clone(),
            input.subject.unwrap_or_else(|| "user".to_string()),
            input.predicate.unwrap_or_else(|| "noted".to_string()),
            input.object.unwrap_or_else(|| content.clone()),
            content,
            input.importance,
        );
        memory.memory_type = input.memory_type;
        memory.tags = input.tags;
        memory.session_id = input.session_id;
        memory.expires_at = input.expires_at;
        memory.embedding = vector.to_vec();
        memory.embedding_model = Some(self.config.embedding_model.clone());

        let (id, outcome) = self.store.upsert(memory).await?;
        Ok(StoredMemory { id, outcome })
    }

    pub async fn clear(
        &self,
        tenant: &TenantId,
        session_id: Option<&str>,
    ) -> Result<usize, CortexError> {
        if !self.is_enabled() {
            return Err(CortexError::MemorySubsystemDisabled);
        }
        let removed = self.store.clear(tenant, session_id).await?;
        info!(tenant = %tenant, session_id, removed, "memories cleared");
        Ok(removed)
    }

    /// Expiration sweep for the store and the embedding cache.
    pub async fn purge_expired(&self) -> Result<usize, CortexError> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        let evicted = self.cache.purge_expired();
        if removed > 0 || evicted > 0 {
            info!(removed, evicted, "expired memories purged");
        }
        Ok(removed)
    }
}
