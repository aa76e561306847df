// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat engine: the single entry point tying sessions, recall, prompt
//! assembly, orchestration and extraction together.
//!
//! Per request, recall happens before prompt assembly, which happens before
//! dispatch. Extraction never delays the reply: turns are queued and, in
//! inline mode, processed by a tracked background task.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cortex_config::{CortexConfig, ExtractionMode};
use cortex_core::types::{AgentRole, ProviderKind, ProviderRequest, SamplingParams};
use cortex_core::{
    ChatMessage, ChatRole, CortexError, HealthStatus, PluginAdapter, ProviderAdapter, SecretStore,
    TenantId,
};
use cortex_memory::{
    augment_system_prompt, format_memory_context, CacheStats, EmbeddingCache,
    ExtractionPipeline, ExtractionReport, ExtractionStatus, MemoryInput, MemoryManager,
    ScoredMemory, StoredMemory,
};
use cortex_providers::{Provider, RetryPolicy};
use cortex_storage::queries::turns;
use cortex_storage::Database;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::orchestrator::{
    combine_prompts, with_user_message, AgentOutcome, OrchestrationRequest, Orchestrator,
    Strategy,
};
use crate::prompts::{ChatContext, PromptBuilder, ResponseStyle};
use crate::registry::{Agent, AgentRegistry, AgentUpdate, NewAgent};
use crate::resolver::{ConfiguredResolver, ProviderResolver};
use crate::session::SessionManager;
use crate::suggestions::{SuggestionCatalog, SuggestionSet};

/// Capacity of the event channel of a streamed reply.
const STREAM_BUFFER: usize = 64;

/// One inbound chat message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub context: Option<ChatContext>,
    /// Falls back to `engine.default_strategy`.
    pub strategy: Option<Strategy>,
    /// Falls back to `engine.default_style`.
    pub style: Option<ResponseStyle>,
    /// Forces the `single` strategy with this agent.
    pub agent_id: Option<String>,
    pub target_role: Option<AgentRole>,
    /// Agents for `parallel` and `chain`, in chain order.
    pub agent_ids: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: String,
    pub strategy: Strategy,
    pub outcomes: Vec<AgentOutcome>,
    /// Memories injected into the system prompt.
    pub memories_used: usize,
    pub failed_stage: Option<usize>,
    pub delegation_rounds: u32,
}

/// Events of a streamed reply. `Done` or `Error` is always last.
#[derive(Debug)]
pub enum ChatEvent {
    Chunk(String),
    Done { session_id: String },
    Error(CortexError),
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub memory_enabled: bool,
    pub extraction_enabled: bool,
    pub extraction_mode: ExtractionMode,
    pub cache: CacheStats,
    pub pending_extraction: Option<u64>,
    pub embedding_provider: HealthStatus,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub purged_memories: usize,
    pub swept_sessions: usize,
}

/// Builds a provider client from the `[providers.<name>]` table, with the
/// key (if any) taken from configuration.
pub fn provider_from_config(
    config: &CortexConfig,
    name: &str,
    retry: RetryPolicy,
) -> Result<Provider, CortexError> {
    let kind = ProviderKind::from_str(name)
        .map_err(|_| CortexError::Config(format!("unknown provider `{name}`")))?;
    let settings = config
        .providers
        .get(name)
        .ok_or_else(|| CortexError::Config(format!("no settings for provider `{name}`")))?;
    let key = settings.api_key.clone().map(SecretString::from);
    Provider::from_settings(kind, settings, key, retry)
}

/// Assembles an [`Engine`]. Collaborators not supplied are built from
/// configuration.
pub struct EngineBuilder {
    config: CortexConfig,
    db: Database,
    secrets: Arc<dyn SecretStore>,
    embedder: Option<Arc<dyn ProviderAdapter>>,
    extractor: Option<Arc<dyn ProviderAdapter>>,
    resolver: Option<Arc<dyn ProviderResolver>>,
    prompts: PromptBuilder,
    suggestions: SuggestionCatalog,
}

impl EngineBuilder {
    pub fn new(config: CortexConfig, db: Database, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            config,
            db,
            secrets,
            embedder: None,
            extractor: None,
            resolver: None,
            prompts: PromptBuilder::builtin(),
            suggestions: SuggestionCatalog::builtin(),
        }
    }

    /// Provider used for embeddings (recall, storage, extraction).
    pub fn embedder(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.embedder = Some(provider);
        self
    }

    /// Provider used to extract memories from conversation turns.
    pub fn extractor(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.extractor = Some(provider);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ProviderResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn suggestions(mut self, catalog: SuggestionCatalog) -> Self {
        self.suggestions = catalog;
        self
    }

    pub fn build(self) -> Result<Engine, CortexError> {
        let config = self.config;
        let retry = RetryPolicy::from(&config.retry);

        let default_strategy = Strategy::from_str(&config.engine.default_strategy).map_err(|_| {
            CortexError::Config(format!(
                "unknown strategy `{}`",
                config.engine.default_strategy
            ))
        })?;
        let default_style = ResponseStyle::from_str(&config.engine.default_style).map_err(|_| {
            CortexError::Config(format!("unknown style `{}`", config.engine.default_style))
        })?;

        let embedder: Arc<dyn ProviderAdapter> = match self.embedder {
            Some(provider) => provider,
            None => Arc::new(provider_from_config(
                &config,
                &config.memory.embedding_provider,
                retry,
            )?),
        };
        // Generation is never retried.
        let extractor: Arc<dyn ProviderAdapter> = match self.extractor {
            Some(provider) => provider,
            None => Arc::new(provider_from_config(
                &config,
                &config.extraction.provider,
                RetryPolicy::none(),
            )?),
        };

        let cache = Arc::new(EmbeddingCache::from_config(Arc::clone(&embedder), &config.cache));
        let memory = MemoryManager::new(self.db.clone(), Arc::clone(&cache), config.memory.clone());
        let extraction = Arc::new(ExtractionPipeline::new(
            self.db.clone(),
            cache,
            extractor,
            config.extraction.clone(),
            &config.memory,
        ));
        let registry = AgentRegistry::new(self.db.clone(), self.secrets);
        let resolver: Arc<dyn ProviderResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(ConfiguredResolver::new(
                registry.clone(),
                config.providers.clone(),
                retry,
            )),
        };
        let orchestrator = Orchestrator::new(registry.clone(), resolver, config.orchestrator.clone());

        info!(
            memory = memory.is_enabled(),
            extraction = extraction.is_active(),
            mode = extraction.mode().as_str(),
            strategy = %default_strategy,
            style = %default_style,
            "engine ready"
        );
        Ok(Engine {
            sessions: SessionManager::new(&config.sessions),
            db: self.db,
            embedder,
            memory,
            extraction,
            registry,
            orchestrator,
            prompts: self.prompts,
            suggestions: self.suggestions,
            default_strategy,
            default_style,
            tasks: TaskTracker::new(),
            config,
        })
    }
}

/// Prompt material shared by the buffered and streamed chat paths.
struct Prepared {
    session_id: String,
    history: Vec<ChatMessage>,
    system_prompt: String,
    params: SamplingParams,
    memories_used: usize,
}

pub struct Engine {
    config: CortexConfig,
    db: Database,
    embedder: Arc<dyn ProviderAdapter>,
    memory: MemoryManager,
    extraction: Arc<ExtractionPipeline>,
    registry: AgentRegistry,
    orchestrator: Orchestrator,
    sessions: SessionManager,
    prompts: PromptBuilder,
    suggestions: SuggestionCatalog,
    default_strategy: Strategy,
    default_style: ResponseStyle,
    tasks: TaskTracker,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.config.engine.name)
            .field("default_strategy", &self.default_strategy)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(config: CortexConfig, db: Database, secrets: Arc<dyn SecretStore>) -> EngineBuilder {
        EngineBuilder::new(config, db, secrets)
    }

    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn extraction(&self) -> &Arc<ExtractionPipeline> {
        &self.extraction
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn prepare(&self, tenant: &TenantId, request: &ChatRequest) -> Result<Prepared, CortexError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(CortexError::Validation("message is empty".to_string()));
        }
        let (session_id, history) = self
            .sessions
            .get_or_create(tenant, request.session_id.as_deref());

        let style = request.style.unwrap_or(self.default_style);
        let base = self.prompts.build(request.context.as_ref(), style);
        let memories = match self.memory.recall(tenant, message).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "recall failed, answering without memory");
                Vec::new()
            }
        };
        let context = format_memory_context(&memories);
        debug!(tenant = %tenant, session_id = %session_id, memories = memories.len(), "prompt assembled");

        Ok(Prepared {
            session_id,
            history,
            system_prompt: augment_system_prompt(&base, context.as_deref()),
            params: style.params(),
            memories_used: memories.len(),
        })
    }

    /// Answer one message. Cancelling `cancel` aborts in-flight agent calls;
    /// nothing of a cancelled request is kept in the session or queued for
    /// extraction.
    pub async fn handle_chat(
        &self,
        tenant: &TenantId,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatReply, CortexError> {
        let prepared = self.prepare(tenant, &request).await?;
        let message = request.message.trim().to_string();

        let result = self
            .orchestrator
            .orchestrate(
                OrchestrationRequest {
                    tenant: tenant.clone(),
                    message: message.clone(),
                    system_prompt: Some(prepared.system_prompt),
                    history: prepared.history,
                    params: prepared.params,
                    strategy: request.strategy.unwrap_or(self.default_strategy),
                    agent_id: request.agent_id,
                    target_role: request.target_role,
                    agent_ids: request.agent_ids,
                },
                &cancel,
            )
            .await?;
        if let Some(partial) = result.partial_failure() {
            warn!(tenant = %tenant, request_id = %result.request_id, error = %partial, "some agents failed");
        }

        self.complete_exchange(tenant, &prepared.session_id, &message, &result.reply)
            .await;
        Ok(ChatReply {
            reply: result.reply,
            session_id: prepared.session_id,
            strategy: result.strategy,
            outcomes: result.outcomes,
            memories_used: prepared.memories_used,
            failed_stage: result.failed_stage,
            delegation_rounds: result.delegation_rounds,
        })
    }

    /// Stream a reply from one agent.
    ///
    /// Setup failures (empty message, no agent) are returned directly;
    /// failures after that arrive as [`ChatEvent::Error`]. Dropping the
    /// receiver or cancelling `cancel` stops generation and discards the
    /// partial reply.
    pub async fn handle_chat_stream(
        self: &Arc<Self>,
        tenant: &TenantId,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ChatEvent>, CortexError> {
        let prepared = self.prepare(tenant, &request).await?;
        let agent = self
            .orchestrator
            .select_agent(tenant, request.agent_id.as_deref(), request.target_role)
            .await?;
        let message = request.message.trim().to_string();
        let provider_request = ProviderRequest {
            model: agent.model.clone(),
            system_prompt: combine_prompts(&agent.system_prompt, Some(&prepared.system_prompt)),
            messages: with_user_message(&prepared.history, message.clone()),
            params: SamplingParams {
                max_tokens: agent.max_tokens,
                temperature: agent.temperature,
                ..prepared.params
            },
        };

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let engine = Arc::clone(self);
        let tenant = tenant.clone();
        let session_id = prepared.session_id;
        self.tasks.spawn(async move {
            let mut stream = match engine
                .orchestrator
                .stream_agent(&tenant, agent, provider_request, &cancel)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(ChatEvent::Error(e)).await;
                    return;
                }
            };

            let mut reply = String::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(session_id = %session_id, "stream cancelled");
                        return;
                    }
                    _ = tx.closed() => {
                        debug!(session_id = %session_id, "stream receiver dropped");
                        return;
                    }
                    next = stream.next_chunk() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        if !chunk.text.is_empty() {
                            reply.push_str(&chunk.text);
                            if tx.send(ChatEvent::Chunk(chunk.text)).await.is_err() {
                                return;
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(agent = %stream.agent().name, error = %e, "stream failed");
                        let _ = tx.send(ChatEvent::Error(e)).await;
                        return;
                    }
                    None => break,
                }
            }
            drop(stream);

            engine
                .complete_exchange(&tenant, &session_id, &message, &reply)
                .await;
            let _ = tx.send(ChatEvent::Done { session_id }).await;
        });
        Ok(rx)
    }

    /// Record a finished exchange in the session and the extraction queue.
    async fn complete_exchange(&self, tenant: &TenantId, session_id: &str, message: &str, reply: &str) {
        self.sessions.append(
            tenant,
            session_id,
            vec![ChatMessage::user(message), ChatMessage::assistant(reply)],
        );
        if !self.extraction.is_active() {
            return;
        }
        for (role, content) in [(ChatRole::User, message), (ChatRole::Assistant, reply)] {
            if let Err(e) = turns::enqueue(&self.db, tenant, session_id, role, content).await {
                warn!(tenant = %tenant, session_id, error = %e, "failed to queue turn for extraction");
                return;
            }
        }
        if self.extraction.mode() == ExtractionMode::Inline {
            let pipeline = Arc::clone(&self.extraction);
            let tenant = tenant.clone();
            let session_id = session_id.to_string();
            self.tasks.spawn(async move {
                if let Err(e) = pipeline.run_session(&tenant, &session_id).await {
                    warn!(tenant = %tenant, session_id = %session_id, error = %e, "inline extraction failed");
                }
            });
        }
    }

    pub async fn store_memory(
        &self,
        tenant: &TenantId,
        input: MemoryInput,
    ) -> Result<StoredMemory, CortexError> {
        self.memory.remember(tenant, input).await
    }

    pub async fn search_memory(
        &self,
        tenant: &TenantId,
        query: &str,
        limit: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, CortexError> {
        self.memory.search(tenant, query, limit, min_similarity).await
    }

    /// Delete the tenant's memories, or only those of one session.
    pub async fn clear_memory(
        &self,
        tenant: &TenantId,
        session_id: Option<&str>,
    ) -> Result<usize, CortexError> {
        self.memory.clear(tenant, session_id).await
    }

    pub fn get_suggestions(&self, tenant: &TenantId, context: Option<&ChatContext>) -> SuggestionSet {
        let set = self.suggestions.suggest(context);
        debug!(tenant = %tenant, count = set.suggestions.len(), "suggestions served");
        set
    }

    /// Process up to `limit` pending turns (capped at `batch_size`).
    pub async fn run_extraction(&self, limit: Option<usize>) -> Result<ExtractionReport, CortexError> {
        self.extraction.run_batch(limit).await
    }

    pub async fn extraction_status(&self) -> Result<ExtractionStatus, CortexError> {
        self.extraction.status().await
    }

    pub async fn create_agent(&self, tenant: &TenantId, agent: NewAgent) -> Result<Agent, CortexError> {
        self.registry.create(tenant, agent).await
    }

    pub async fn get_agent(&self, tenant: &TenantId, id: &str) -> Result<Agent, CortexError> {
        self.registry.get(tenant, id).await
    }

    pub async fn list_agents(&self, tenant: &TenantId, active_only: bool) -> Result<Vec<Agent>, CortexError> {
        self.registry.list(tenant, active_only).await
    }

    pub async fn update_agent(
        &self,
        tenant: &TenantId,
        id: &str,
        update: AgentUpdate,
    ) -> Result<Agent, CortexError> {
        self.registry.update(tenant, id, update).await
    }

    pub async fn delete_agent(&self, tenant: &TenantId, id: &str) -> Result<(), CortexError> {
        self.registry.delete(tenant, id).await
    }

    pub async fn health(&self) -> HealthReport {
        let database = match self.db.health_check().await {
            Ok(status) => status,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        let embedding_provider = match self.embedder.health_check().await {
            Ok(status) => status,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        let pending_extraction = match self.extraction.status().await {
            Ok(status) => Some(status.pending_count),
            Err(e) => {
                warn!(error = %e, "failed to read extraction queue");
                None
            }
        };

        let status = if !database.is_healthy() {
            HealthStatus::Unhealthy("database unreachable".to_string())
        } else if self.memory.is_enabled() && !embedding_provider.is_healthy() {
            HealthStatus::Degraded("embedding provider unavailable".to_string())
        } else {
            HealthStatus::Healthy
        };
        HealthReport {
            status,
            database,
            memory_enabled: self.memory.is_enabled(),
            extraction_enabled: self.extraction.is_active(),
            extraction_mode: self.extraction.mode(),
            cache: self.memory.cache_stats(),
            pending_extraction,
            embedding_provider,
            active_sessions: self.sessions.len(),
        }
    }

    /// Purge expired memories and cache entries and drop idle sessions.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, CortexError> {
        let purged_memories = self.memory.purge_expired().await?;
        let swept_sessions = self.sessions.sweep_idle();
        Ok(MaintenanceReport {
            purged_memories,
            swept_sessions,
        })
    }

    /// Stop accepting background work and wait up to `timeout` for running
    /// extraction and stream tasks.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!(remaining = self.tasks.len(), "background tasks still running at shutdown");
        } else {
            info!("engine drained");
        }
    }
}
