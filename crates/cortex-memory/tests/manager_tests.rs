// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use cortex_config::model::MemoryConfig;
use cortex_core::{CortexError, ProviderAdapter, TenantId};
use cortex_memory::{
    EmbeddingCache, MemoryInput, MemoryManager, UpsertOutcome, augment_system_prompt,
    format_memory_context,
};
use cortex_test_utils::{MockProvider, test_db};

async fn manager(mock: MockProvider, config: MemoryConfig) -> MemoryManager {
    let db = test_db().await.unwrap();
    let provider: Arc<dyn ProviderAdapter> = Arc::new(mock);
    let cache = Arc::new(EmbeddingCache::new(provider, 100, Duration::from_secs(60)));
    MemoryManager::new(db, cache, config)
}

fn relaxed() -> MemoryConfig {
    MemoryConfig {
        min_similarity: 0.1,
        ..MemoryConfig::default()
    }
}

#[tokio::test]
async fn remember_then_recall_into_prompt() {
    let memories = manager(MockProvider::new("mock"), relaxed()).await;
    let tenant = TenantId::from("acme");

    let mut allergy = MemoryInput::new("User is allergic to shellfish");
    allergy.importance = 1.0;
    memories.remember(&tenant, allergy).await.unwrap();
    memories
        .remember(&tenant, MemoryInput::new("User prefers dark mode in the editor"))
        .await
        .unwrap();

    let recalled = memories.recall(&tenant, "which editor mode do I prefer").await.unwrap();
    assert!(recalled[0].critical);
    assert!(recalled.iter().any(|m| m.memory.content.contains("dark mode")));

    let context = format_memory_context(&recalled).unwrap();
    let prompt = augment_system_prompt("You are helpful.", Some(&context));
    assert!(prompt.starts_with("[Critical information about the user:]\n- User is allergic to shellfish"));
    assert!(prompt.contains("- User prefers dark mode in the editor"));
}

#[tokio::test]
async fn remembering_the_same_text_updates() {
    let memories = manager(MockProvider::new("mock"), relaxed()).await;
    let tenant = TenantId::from("acme");

    let first = memories
        .remember(&tenant, MemoryInput::new("User drinks oat milk"))
        .await
        .unwrap();
    let second = memories
        .remember(&tenant, MemoryInput::new("User drinks oat milk"))
        .await
        .unwrap();
    assert_eq!(first.outcome, UpsertOutcome::Created);
    assert_eq!(second.outcome, UpsertOutcome::Updated);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn search_is_tenant_scoped() {
    let memories = manager(MockProvider::new("mock"), relaxed()).await;
    memories
        .remember(&TenantId::from("a"), MemoryInput::new("User plays the cello"))
        .await
        .unwrap();

    let own = memories
        .search(&TenantId::from("a"), "cello", None, None)
        .await
        .unwrap();
    let other = memories
        .search(&TenantId::from("b"), "cello", None, None)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert!(other.is_empty());
}

#[tokio::test]
async fn clear_removes_tenant_memories() {
    let memories = manager(MockProvider::new("mock"), relaxed()).await;
    let tenant = TenantId::from("acme");
    memories
        .remember(&tenant, MemoryInput::new("User lives in Porto"))
        .await
        .unwrap();
    assert_eq!(memories.clear(&tenant, None).await.unwrap(), 1);
    assert_eq!(memories.store().count(&tenant).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let memories = manager(MockProvider::new("mock"), relaxed()).await;
    let tenant = TenantId::from("acme");
    assert!(matches!(
        memories.remember(&tenant, MemoryInput::new("   ")).await,
        Err(CortexError::Validation(_))
    ));
    assert!(matches!(
        memories.search(&tenant, "", None, None).await,
        Err(CortexError::Validation(_))
    ));
}

#[tokio::test]
async fn disabled_memory_refuses_explicit_operations() {
    let config = MemoryConfig {
        enabled: false,
        ..MemoryConfig::default()
    };
    let memories = manager(MockProvider::new("mock"), config).await;
    let tenant = TenantId::from("acme");

    assert!(memories.recall(&tenant, "anything").await.unwrap().is_empty());
    assert!(matches!(
        memories.remember(&tenant, MemoryInput::new("User likes tea")).await,
        Err(CortexError::MemorySubsystemDisabled)
    ));
    assert!(matches!(
        memories.search(&tenant, "tea", None, None).await,
        Err(CortexError::MemorySubsystemDisabled)
    ));
    assert!(matches!(
        memories.clear(&tenant, None).await,
        Err(CortexError::MemorySubsystemDisabled)
    ));
}

#[tokio::test]
async fn repeated_embeddings_hit_the_cache() {
    let memories = manager(MockProvider::new("mock"), relaxed()).await;
    let tenant = TenantId::from("acme");
    memories
        .remember(&tenant, MemoryInput::new("User collects vinyl"))
        .await
        .unwrap();
    memories.search(&tenant, "User collects vinyl", None, None).await.unwrap();

    let stats = memories.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn embedding_outage_recalls_critical_memories_only() {
    let db = test_db().await.unwrap();
    let mock = Arc::new(MockProvider::new("mock"));
    let cache = Arc::new(EmbeddingCache::new(mock.clone(), 100, Duration::from_secs(60)));
    let memories = MemoryManager::new(db, cache, relaxed());
    let tenant = TenantId::from("acme");

    let mut allergy = MemoryInput::new("User is allergic to shellfish");
    allergy.importance = 1.0;
    memories.remember(&tenant, allergy).await.unwrap();
    memories
        .remember(&tenant, MemoryInput::new("User prefers dark mode in the editor"))
        .await
        .unwrap();

    mock.fail_next_embeddings(5);
    let recalled = memories.recall(&tenant, "what should I cook tonight").await.unwrap();
    assert_eq!(recalled.len(), 1);
    assert!(recalled[0].critical);
    assert!(logs_contain("recalling critical memories only"));

    let err = memories.search(&tenant, "what should I cook tonight", None, None).await;
    assert!(err.is_err());
}
