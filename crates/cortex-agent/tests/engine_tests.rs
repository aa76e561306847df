// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{engine, engine_with_extractor, Fixture};
use cortex_agent::{
    AgentUpdate, ChatContext, ChatEvent, ChatRequest, NewAgent, ResponseStyle, Strategy,
    spawn_scheduler,
};
use cortex_config::{CortexConfig, ExtractionMode};
use cortex_core::types::{AgentRole, ChatRole, ProviderKind};
use cortex_core::{CortexError, HealthStatus};
use cortex_memory::MemoryInput;
use cortex_storage::queries::turns;
use cortex_test_utils::MockProvider;
use tokio_util::sync::CancellationToken;

const SHELLFISH_REPLY: &str = r#"{"memories": [
    {"subject": "user", "predicate": "allergic_to", "object": "shellfish",
     "object_type": "medical", "importance": 1.0, "tags": ["allergy"],
     "natural_language": "User is allergic to shellfish"}
]}"#;

fn embedder() -> Arc<MockProvider> {
    Arc::new(MockProvider::new("embedder"))
}

#[tokio::test]
async fn chat_injects_memories_and_queues_turns() {
    let fixture = Fixture::new().await;
    let (_, lead) = fixture
        .agent_with_prompt(
            "lead",
            AgentRole::Leader,
            "You are a cooking assistant.",
            MockProvider::new("l").with_default_reply("Try a mushroom risotto."),
        )
        .await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    let mut critical = MemoryInput::new("User is allergic to shellfish");
    critical.importance = 1.0;
    engine.store_memory(&fixture.tenant, critical).await.unwrap();

    let reply = engine
        .handle_chat(
            &fixture.tenant,
            ChatRequest::new("what should I cook tonight?"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(reply.reply, "Try a mushroom risotto.");
    assert_eq!(reply.strategy, Strategy::Single);
    assert_eq!(reply.memories_used, 1);

    let system = lead.last_request().unwrap().system_prompt.unwrap();
    assert!(system.starts_with("You are a cooking assistant.\n\n[Critical information about the user:]"));
    assert!(system.contains("- User is allergic to shellfish"));
    assert!(system.ends_with("You are a helpful AI assistant."));

    let status = engine.extraction_status().await.unwrap();
    assert_eq!(status.pending_count, 2);
    assert_eq!(
        engine
            .sessions()
            .history(&fixture.tenant, &reply.session_id)
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn chat_request_selects_chain_members() {
    let fixture = Fixture::new().await;
    let (_, lead) = fixture
        .agent("lead", AgentRole::Leader, MockProvider::new("l").with_default_reply("lead says"))
        .await;
    let (research, _) = fixture
        .agent("research", AgentRole::Researcher, MockProvider::new("s").with_default_reply("found it"))
        .await;
    let (code, _) = fixture
        .agent("code", AgentRole::Coder, MockProvider::new("c").with_default_reply("wrote it"))
        .await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());

    let request: ChatRequest = serde_json::from_value(serde_json::json!({
        "message": "summarize the parser work",
        "strategy": "chain",
        "agent_ids": [code.id, research.id],
    }))
    .unwrap();
    let reply = engine
        .handle_chat(&fixture.tenant, request, CancellationToken::new())
        .await
        .unwrap();
    let names: Vec<&str> = reply.outcomes.iter().map(|o| o.agent_name.as_str()).collect();
    assert_eq!(names, ["code", "research"]);
    assert_eq!(reply.reply, "found it");
    assert_eq!(lead.generate_calls(), 0);
}

#[tokio::test]
async fn sessions_carry_history_between_messages() {
    let fixture = Fixture::new().await;
    let (_, lead) = fixture
        .agent("lead", AgentRole::Leader, MockProvider::new("l").with_replies(["first", "second"]))
        .await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());

    let first = engine
        .handle_chat(&fixture.tenant, ChatRequest::new("hello there"), CancellationToken::new())
        .await
        .unwrap();
    let mut follow_up = ChatRequest::new("and then?");
    follow_up.session_id = Some(first.session_id.clone());
    let second = engine
        .handle_chat(&fixture.tenant, follow_up, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.reply, "second");

    let messages = lead.last_request().unwrap().messages;
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["hello there", "first", "and then?"]);
}

#[tokio::test]
async fn request_style_and_context_shape_the_prompt() {
    let fixture = Fixture::new().await;
    let (_, lead) = fixture.agent("lead", AgentRole::Leader, MockProvider::new("l")).await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());

    let mut request = ChatRequest::new("how do I export?");
    request.style = Some(ResponseStyle::Brief);
    request.context = Some(ChatContext {
        app: Some("Shopfront".into()),
        page: Some("orders".into()),
        ..ChatContext::default()
    });
    engine
        .handle_chat(&fixture.tenant, request, CancellationToken::new())
        .await
        .unwrap();

    let sent = lead.last_request().unwrap();
    let system = sent.system_prompt.unwrap();
    assert!(system.contains("You are the AI assistant for Shopfront."));
    assert!(system.contains("The user is currently on the orders page."));
    assert_eq!(sent.params.top_p, Some(0.9));
    assert_eq!(sent.params.repeat_penalty, Some(1.2));
    // The agent's own limits win over the style preset.
    assert_eq!(sent.params.max_tokens, 1024);
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let fixture = Fixture::new().await;
    fixture.agent("lead", AgentRole::Leader, MockProvider::new("l")).await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());

    let err = engine
        .handle_chat(&fixture.tenant, ChatRequest::new("   "), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CortexError::Validation(_)));
}

#[tokio::test]
async fn disabled_memory_is_a_soft_failure_for_chat() {
    let fixture = Fixture::new().await;
    let (_, lead) = fixture.agent("lead", AgentRole::Leader, MockProvider::new("l")).await;
    let mut config = CortexConfig::default();
    config.memory.enabled = false;
    let embedder = embedder();
    let engine = engine(&fixture, config, Arc::clone(&embedder));

    let reply = engine
        .handle_chat(&fixture.tenant, ChatRequest::new("hello there"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.memories_used, 0);
    assert!(!lead.last_request().unwrap().system_prompt.unwrap().contains("[Critical"));
    assert_eq!(embedder.embed_calls(), 0);
    assert_eq!(engine.extraction_status().await.unwrap().pending_count, 0);

    let err = engine
        .store_memory(&fixture.tenant, MemoryInput::new("likes tea"))
        .await
        .unwrap_err();
    assert!(matches!(err, CortexError::MemorySubsystemDisabled));
    assert!(matches!(
        engine.search_memory(&fixture.tenant, "tea", None, None).await,
        Err(CortexError::MemorySubsystemDisabled)
    ));
    assert!(matches!(
        engine.clear_memory(&fixture.tenant, None).await,
        Err(CortexError::MemorySubsystemDisabled)
    ));
}

#[tokio::test]
async fn inline_extraction_runs_in_the_background() {
    let fixture = Fixture::new().await;
    fixture.agent("lead", AgentRole::Leader, MockProvider::new("l")).await;
    let mut config = CortexConfig::default();
    config.extraction.mode = ExtractionMode::Inline;
    let extractor = Arc::new(MockProvider::new("extractor").with_default_reply(SHELLFISH_REPLY));
    let engine = engine_with_extractor(&fixture, config, embedder(), Arc::clone(&extractor));

    engine
        .handle_chat(
            &fixture.tenant,
            ChatRequest::new("I'm allergic to shellfish, please remember that"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    engine.shutdown(Duration::from_secs(5)).await;

    assert_eq!(extractor.generate_calls(), 1);
    assert_eq!(engine.memory().store().count(&fixture.tenant).await.unwrap(), 1);
    assert_eq!(engine.extraction_status().await.unwrap().pending_count, 0);
}

#[tokio::test]
async fn batch_extraction_is_triggered_by_the_admin() {
    let fixture = Fixture::new().await;
    fixture.agent("lead", AgentRole::Leader, MockProvider::new("l")).await;
    let extractor = Arc::new(MockProvider::new("extractor").with_default_reply(SHELLFISH_REPLY));
    let engine = engine_with_extractor(&fixture, CortexConfig::default(), embedder(), extractor);

    engine
        .handle_chat(
            &fixture.tenant,
            ChatRequest::new("I'm allergic to shellfish, please remember that"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(engine.extraction_status().await.unwrap().pending_count, 2);

    let report = engine.run_extraction(None).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.memories_created, 1);
    assert_eq!(engine.extraction_status().await.unwrap().pending_count, 0);
}

#[tokio::test]
async fn streaming_yields_chunks_then_done() {
    let fixture = Fixture::new().await;
    fixture
        .agent("lead", AgentRole::Leader, MockProvider::new("l").with_default_reply("hello there world"))
        .await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());

    let mut rx = engine
        .handle_chat_stream(&fixture.tenant, ChatRequest::new("greet me"), CancellationToken::new())
        .await
        .unwrap();
    let mut text = String::new();
    let mut done = None;
    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::Chunk(chunk) => text.push_str(&chunk),
            ChatEvent::Done { session_id } => done = Some(session_id),
            ChatEvent::Error(e) => panic!("stream failed: {e}"),
        }
    }
    assert_eq!(text, "hello there world");
    let session_id = done.expect("terminal event");
    let history = engine.sessions().history(&fixture.tenant, &session_id).unwrap();
    assert_eq!(history[1].content, "hello there world");
    assert_eq!(engine.extraction_status().await.unwrap().pending_count, 2);
}

#[tokio::test]
async fn cancelled_streams_persist_nothing() {
    let fixture = Fixture::new().await;
    fixture.agent("lead", AgentRole::Leader, MockProvider::new("l")).await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut request = ChatRequest::new("greet me");
    request.session_id = Some("s-1".to_string());
    let mut rx = engine
        .handle_chat_stream(&fixture.tenant, request, cancel)
        .await
        .unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.as_slice(), [ChatEvent::Error(CortexError::Cancelled)]));
    assert!(engine.sessions().history(&fixture.tenant, "s-1").unwrap().is_empty());
    assert_eq!(engine.extraction_status().await.unwrap().pending_count, 0);
}

#[tokio::test]
async fn streaming_without_agents_fails_up_front() {
    let fixture = Fixture::new().await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    let err = engine
        .handle_chat_stream(&fixture.tenant, ChatRequest::new("hi there"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CortexError::OrchestrationFailed { .. }));
}

#[tokio::test]
async fn agent_crud_goes_through_the_engine() {
    let fixture = Fixture::new().await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    let tenant = &fixture.tenant;

    let agent = engine
        .create_agent(tenant, NewAgent::new("helper", AgentRole::Coder, ProviderKind::Ollama, "llama3.2"))
        .await
        .unwrap();
    assert_eq!(engine.list_agents(tenant, true).await.unwrap().len(), 1);

    let updated = engine
        .update_agent(
            tenant,
            &agent.id,
            AgentUpdate {
                enabled: Some(false),
                ..AgentUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.enabled);
    assert!(engine.list_agents(tenant, true).await.unwrap().is_empty());
    assert_eq!(engine.list_agents(tenant, false).await.unwrap().len(), 1);

    engine.delete_agent(tenant, &agent.id).await.unwrap();
    assert!(matches!(
        engine.get_agent(tenant, &agent.id).await,
        Err(CortexError::NotFound { .. })
    ));
}

#[tokio::test]
async fn health_reports_cache_and_queue() {
    let fixture = Fixture::new().await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    engine
        .store_memory(&fixture.tenant, MemoryInput::new("User prefers dark mode"))
        .await
        .unwrap();
    engine
        .search_memory(&fixture.tenant, "User prefers dark mode", None, None)
        .await
        .unwrap();

    let health = engine.health().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.memory_enabled);
    assert_eq!(health.extraction_mode, ExtractionMode::Batch);
    assert_eq!(health.cache.size, 1);
    assert_eq!(health.cache.hits, 1);
    assert_eq!(health.cache.misses, 1);
    assert_eq!(health.pending_extraction, Some(0));
}

#[tokio::test]
async fn maintenance_purges_expired_memories() {
    let fixture = Fixture::new().await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    let mut stale = MemoryInput::new("User is travelling this week");
    stale.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
    engine.store_memory(&fixture.tenant, stale).await.unwrap();
    engine
        .store_memory(&fixture.tenant, MemoryInput::new("User lives in Lisbon"))
        .await
        .unwrap();

    let report = engine.run_maintenance().await.unwrap();
    assert_eq!(report.purged_memories, 1);
    assert_eq!(engine.memory().store().count(&fixture.tenant).await.unwrap(), 1);
}

#[tokio::test]
async fn scheduler_recovers_abandoned_claims_while_running() {
    let fixture = Fixture::new().await;
    let mut config = CortexConfig::default();
    config.extraction.interval_secs = 1;
    let extractor = Arc::new(MockProvider::new("extractor").with_default_reply("[]"));
    let engine = engine_with_extractor(&fixture, config, embedder(), extractor);
    let cancel = CancellationToken::new();
    let scheduler = spawn_scheduler(Arc::clone(&engine), cancel.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A run that claimed turns and died without settling them.
    for role in [ChatRole::User, ChatRole::Assistant] {
        turns::enqueue(&fixture.db, &fixture.tenant, "s1", role, "Planning a trip to Madeira")
            .await
            .unwrap();
    }
    assert_eq!(turns::claim_batch(&fixture.db, 10).await.unwrap().len(), 2);
    fixture
        .db
        .connection()
        .call(|conn| {
            conn.execute(
                "UPDATE conversation_turns SET claimed_at = '2000-01-01T00:00:00.000Z'",
                [],
            )
        })
        .await
        .unwrap();
    assert_eq!(engine.extraction_status().await.unwrap().processing_count, 2);

    let settled = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = engine.extraction_status().await.unwrap();
            if status.processing_count == 0 && status.pending_count == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "abandoned claims were never recovered");

    cancel.cancel();
    scheduler.await.unwrap();
}

#[tokio::test]
async fn suggestions_follow_the_page_context() {
    let fixture = Fixture::new().await;
    let engine = engine(&fixture, CortexConfig::default(), embedder());
    let context = ChatContext {
        app: Some("exportee".into()),
        page: Some("mappings".into()),
        ..ChatContext::default()
    };
    let set = engine.get_suggestions(&fixture.tenant, Some(&context));
    assert_eq!(set.suggestions.len(), 3);
    assert_eq!(set.context_summary.as_deref(), Some("App: exportee | Page: mappings"));
}
