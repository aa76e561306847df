// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-agent orchestration.
//!
//! A request runs against the tenant's active agents with one of four
//! strategies:
//! - **single**: one agent answers (explicit id, then role, then the leader,
//!   then the oldest agent)
//! - **leader**: the leader may delegate to specialists and synthesizes
//!   their results, bounded by `max_delegation_depth`
//! - **parallel**: every agent (or the listed `agent_ids`) answers the same
//!   input concurrently
//! - **chain**: researcher, coder, reviewer, then leader, each building on
//!   the previous output; a failure halts the chain. `agent_ids` replaces
//!   both the members and their order
//!
//! Every provider call holds a per-tenant permit, carries a deadline and
//! aborts when the request's [`CancellationToken`] fires.

use std::sync::Arc;
use std::time::Duration;

use cortex_config::model::OrchestratorConfig;
use cortex_core::types::{
    AgentRole, ChatMessage, ProviderRequest, ProviderStreamChunk, SamplingParams,
};
use cortex_core::{ChunkStream, CortexError, TenantId};
use dashmap::DashMap;
use futures::StreamExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delegation::{
    format_specialist_results, leader_system_prompt, parse_delegation, SpecialistReport,
};
use crate::registry::{Agent, AgentRegistry};
use crate::resolver::ProviderResolver;

/// How a request is spread over agents.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Single,
    Leader,
    Parallel,
    Chain,
}

/// Lifecycle of one orchestration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationState {
    Received,
    Dispatched,
    AwaitingAgents,
    Aggregating,
    Done,
    Failed,
}

impl OrchestrationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrchestrationState::Done | OrchestrationState::Failed)
    }

    /// Leader rounds and chain stages go back to `Dispatched` after each
    /// wait; anything that is not terminal may fail.
    pub fn can_advance_to(self, next: OrchestrationState) -> bool {
        use OrchestrationState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Received, Dispatched)
            | (Dispatched, AwaitingAgents)
            | (AwaitingAgents, Dispatched)
            | (AwaitingAgents, Aggregating)
            | (Aggregating, Done) => true,
            _ => false,
        }
    }
}

/// Tracks and validates the state transitions of one request.
#[derive(Debug)]
struct Lifecycle {
    request_id: String,
    state: OrchestrationState,
    history: Vec<OrchestrationState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            state: OrchestrationState::Received,
            history: vec![OrchestrationState::Received],
        }
    }

    fn advance(&mut self, next: OrchestrationState) -> Result<(), CortexError> {
        if !self.state.can_advance_to(next) {
            return Err(CortexError::Internal(format!(
                "invalid orchestration transition {} -> {}",
                self.state, next
            )));
        }
        debug!(request_id = %self.request_id, from = %self.state, to = %next, "orchestration transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = OrchestrationState::Failed;
            self.history.push(OrchestrationState::Failed);
        }
    }
}

/// Input of one orchestration.
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    pub tenant: TenantId,
    pub message: String,
    /// Engine-built prompt (persona, page context, memories). Appended after
    /// each agent's own system prompt.
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    /// Style parameters. Each agent's `max_tokens` and `temperature` win.
    pub params: SamplingParams,
    pub strategy: Strategy,
    /// Forces `single` with this agent.
    pub agent_id: Option<String>,
    /// Preferred role for `single`.
    pub target_role: Option<AgentRole>,
    /// Agents for `parallel` and `chain`, in chain order.
    pub agent_ids: Option<Vec<String>>,
}

impl OrchestrationRequest {
    pub fn new(tenant: TenantId, message: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            tenant,
            message: message.into(),
            system_prompt: None,
            history: Vec::new(),
            params: SamplingParams::default(),
            strategy,
            agent_id: None,
            target_role: None,
            agent_ids: None,
        }
    }
}

/// Per-agent status within a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutcome {
    pub agent_id: String,
    pub agent_name: String,
    pub role: AgentRole,
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
}

impl AgentOutcome {
    fn new(agent: &Agent, result: &Result<String, CortexError>) -> Self {
        let (success, content, error) = match result {
            Ok(content) => (true, content.clone(), None),
            Err(e) => (false, String::new(), Some(e.to_string())),
        };
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            role: agent.role,
            success,
            content,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub request_id: String,
    /// Strategy that actually ran; `leader` without a leader agent runs `single`.
    pub strategy: Strategy,
    pub reply: String,
    pub outcomes: Vec<AgentOutcome>,
    /// Zero-based chain stage that failed, when the chain was cut short.
    pub failed_stage: Option<usize>,
    pub delegation_rounds: u32,
    pub transitions: Vec<OrchestrationState>,
}

impl OrchestrationResult {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// Non-fatal summary when some, but not all, agents failed.
    pub fn partial_failure(&self) -> Option<CortexError> {
        let failed = self.failed_count();
        (failed > 0).then(|| CortexError::PartialOrchestrationFailure {
            failed,
            total: self.outcomes.len(),
        })
    }
}

/// A streamed answer from one agent, holding its tenant permit until dropped.
pub struct AgentStream {
    agent: Agent,
    stream: ChunkStream,
    deadline: Duration,
    _permit: OwnedSemaphorePermit,
}

impl AgentStream {
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Next chunk, or `None` at the end of the stream. Waiting longer than
    /// the call deadline for any chunk fails with `ProviderUnavailable`.
    pub async fn next_chunk(&mut self) -> Option<Result<ProviderStreamChunk, CortexError>> {
        match tokio::time::timeout(self.deadline, self.stream.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(deadline_exceeded(&self.agent, self.deadline))),
        }
    }
}

fn deadline_exceeded(agent: &Agent, deadline: Duration) -> CortexError {
    CortexError::unavailable(
        agent.provider.to_string(),
        format!("agent `{}` gave no answer within {}s", agent.name, deadline.as_secs()),
    )
}

pub(crate) fn combine_prompts(agent_prompt: &str, request_prompt: Option<&str>) -> Option<String> {
    let agent_prompt = agent_prompt.trim();
    match request_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(request) if !agent_prompt.is_empty() => Some(format!("{agent_prompt}\n\n{request}")),
        Some(request) => Some(request.to_string()),
        None => (!agent_prompt.is_empty()).then(|| agent_prompt.to_string()),
    }
}

pub(crate) fn with_user_message(history: &[ChatMessage], content: String) -> Vec<ChatMessage> {
    let mut messages = history.to_vec();
    messages.push(ChatMessage::user(content));
    messages
}

pub struct Orchestrator {
    registry: AgentRegistry,
    resolver: Arc<dyn ProviderResolver>,
    config: OrchestratorConfig,
    permits: DashMap<TenantId, Arc<Semaphore>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        registry: AgentRegistry,
        resolver: Arc<dyn ProviderResolver>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            resolver,
            config,
            permits: DashMap::new(),
        }
    }

    fn call_deadline(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    fn tenant_permits(&self, tenant: &TenantId) -> Arc<Semaphore> {
        let limit = self.config.max_concurrent_calls_per_tenant.max(1);
        Arc::clone(
            self.permits
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(limit)))
                .value(),
        )
    }

    async fn acquire(
        &self,
        tenant: &TenantId,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, CortexError> {
        let semaphore = self.tenant_permits(tenant);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CortexError::Cancelled),
            permit = semaphore.acquire_owned() => permit
                .map_err(|_| CortexError::Internal("tenant call limiter closed".to_string())),
        }
    }

    /// Pick the agent a `single` request (or a stream) goes to.
    pub async fn select_agent(
        &self,
        tenant: &TenantId,
        agent_id: Option<&str>,
        role: Option<AgentRole>,
    ) -> Result<Agent, CortexError> {
        let agents = self.active_agents(tenant).await?;
        pick_single(agents, agent_id, role)
    }

    async fn active_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, CortexError> {
        let agents = self.registry.list(tenant, true).await?;
        if agents.is_empty() {
            return Err(CortexError::OrchestrationFailed {
                message: "no active agents are configured".to_string(),
            });
        }
        Ok(agents)
    }

    /// Run a request to completion.
    ///
    /// `single` and `leader` propagate the answering agent's own error.
    /// `parallel` and `chain` fail with `OrchestrationFailed` only when no
    /// agent produced output; otherwise per-agent status is reported.
    pub async fn orchestrate(
        &self,
        request: OrchestrationRequest,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, CortexError> {
        let mut life = Lifecycle::new();
        let strategy = if request.agent_id.is_some() {
            Strategy::Single
        } else {
            request.strategy
        };
        info!(
            request_id = %life.request_id,
            tenant = %request.tenant,
            strategy = %strategy,
            "orchestration received"
        );

        let outcome = match self.active_agents(&request.tenant).await {
            Ok(agents) => match strategy {
                Strategy::Single => self.run_single(&request, agents, &mut life, cancel).await,
                Strategy::Leader => self.run_leader(&request, agents, &mut life, cancel).await,
                Strategy::Parallel => match pick_listed(agents, request.agent_ids.as_deref()) {
                    Ok(agents) => self.run_parallel(&request, agents, &mut life, cancel).await,
                    Err(e) => Err(e),
                },
                Strategy::Chain => match pick_listed(agents, request.agent_ids.as_deref()) {
                    Ok(agents) => self.run_chain(&request, agents, &mut life, cancel).await,
                    Err(e) => Err(e),
                },
            },
            Err(e) => Err(e),
        };
        let outcome = outcome.and_then(|result| {
            if cancel.is_cancelled() {
                Err(CortexError::Cancelled)
            } else {
                Ok(result)
            }
        });

        match outcome {
            Ok(mut result) => {
                life.advance(OrchestrationState::Done)?;
                result.transitions = life.history;
                metrics::counter!("cortex_orchestrations_total", "strategy" => result.strategy.as_ref().to_string(), "outcome" => "done").increment(1);
                info!(
                    request_id = %result.request_id,
                    strategy = %result.strategy,
                    agents = result.outcomes.len(),
                    failed = result.failed_count(),
                    "orchestration done"
                );
                Ok(result)
            }
            Err(e) => {
                life.fail();
                metrics::counter!("cortex_orchestrations_total", "strategy" => strategy.as_ref().to_string(), "outcome" => e.kind()).increment(1);
                warn!(request_id = %life.request_id, strategy = %strategy, error = %e, "orchestration failed");
                Err(e)
            }
        }
    }

    async fn call_agent(
        &self,
        request: &OrchestrationRequest,
        agent: &Agent,
        system_prompt: Option<String>,
        messages: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<String, CortexError> {
        let _permit = self.acquire(&request.tenant, cancel).await?;
        let deadline = self.call_deadline();
        let call = async {
            let provider = self.resolver.resolve(agent).await?;
            let response = provider
                .generate(ProviderRequest {
                    model: agent.model.clone(),
                    system_prompt,
                    messages,
                    params: SamplingParams {
                        max_tokens: agent.max_tokens,
                        temperature: agent.temperature,
                        ..request.params.clone()
                    },
                })
                .await?;
            Ok(response.content)
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CortexError::Cancelled),
            timed = tokio::time::timeout(deadline, call) => match timed {
                Ok(result) => result,
                Err(_) => Err(deadline_exceeded(agent, deadline)),
            },
        };
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!("cortex_agent_calls_total", "provider" => agent.provider.as_ref().to_string(), "outcome" => outcome).increment(1);
        match &result {
            Ok(content) => debug!(agent = %agent.name, chars = content.len(), "agent answered"),
            Err(CortexError::Cancelled) => debug!(agent = %agent.name, "agent call cancelled"),
            Err(e) => error!(agent = %agent.name, provider = %agent.provider, error = %e, "agent call failed"),
        }
        result
    }

    async fn run_single(
        &self,
        request: &OrchestrationRequest,
        agents: Vec<Agent>,
        life: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, CortexError> {
        let agent = pick_single(agents, request.agent_id.as_deref(), request.target_role)?;
        life.advance(OrchestrationState::Dispatched)?;
        let call = self.call_agent(
            request,
            &agent,
            combine_prompts(&agent.system_prompt, request.system_prompt.as_deref()),
            with_user_message(&request.history, request.message.clone()),
            cancel,
        );
        life.advance(OrchestrationState::AwaitingAgents)?;
        let reply = call.await?;
        life.advance(OrchestrationState::Aggregating)?;

        Ok(OrchestrationResult {
            request_id: life.request_id.clone(),
            strategy: Strategy::Single,
            outcomes: vec![AgentOutcome::new(&agent, &Ok(reply.clone()))],
            reply,
            failed_stage: None,
            delegation_rounds: 0,
            transitions: Vec::new(),
        })
    }

    async fn run_leader(
        &self,
        request: &OrchestrationRequest,
        agents: Vec<Agent>,
        life: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, CortexError> {
        let Some(leader_idx) = agents.iter().position(|a| a.role == AgentRole::Leader) else {
            debug!(tenant = %request.tenant, "no leader agent, answering with a single agent");
            return self.run_single(request, agents, life, cancel).await;
        };
        let mut specialists = agents;
        let leader = specialists.remove(leader_idx);
        let system_prompt = combine_prompts(
            &leader_system_prompt(&leader, &specialists, self.config.manifest_prompt_chars),
            request.system_prompt.as_deref(),
        );

        let mut messages = with_user_message(&request.history, request.message.clone());
        let mut outcomes = Vec::new();
        let mut rounds: u32 = 0;
        let reply = loop {
            life.advance(OrchestrationState::Dispatched)?;
            let call = self.call_agent(request, &leader, system_prompt.clone(), messages.clone(), cancel);
            life.advance(OrchestrationState::AwaitingAgents)?;
            let output = call.await?;

            let Some(tasks) = parse_delegation(&output) else {
                outcomes.push(AgentOutcome::new(&leader, &Ok(output.clone())));
                break output;
            };
            if rounds >= self.config.max_delegation_depth {
                warn!(tenant = %request.tenant, depth = rounds, "leader exceeded delegation depth");
                return Err(CortexError::DelegationLoopExceeded {
                    depth: rounds,
                    partial: output,
                });
            }
            rounds += 1;
            info!(tenant = %request.tenant, round = rounds, tasks = tasks.len(), "leader delegated");

            life.advance(OrchestrationState::Dispatched)?;
            let calls = tasks.iter().map(|task| {
                let specialist = specialists
                    .iter()
                    .find(|a| a.name.eq_ignore_ascii_case(task.agent.trim()));
                async move {
                    let Some(specialist) = specialist else {
                        return (task, None, Err(format!("unknown agent `{}`", task.agent)));
                    };
                    let result = self
                        .call_agent(
                            request,
                            specialist,
                            combine_prompts(&specialist.system_prompt, request.system_prompt.as_deref()),
                            vec![ChatMessage::user(format!(
                                "{}\n\nOriginal request:\n{}",
                                task.task, request.message
                            ))],
                            cancel,
                        )
                        .await;
                    let outcome = AgentOutcome::new(specialist, &result);
                    (task, Some(outcome), result.map_err(|e| e.to_string()))
                }
            });
            life.advance(OrchestrationState::AwaitingAgents)?;
            let results = join_all(calls).await;
            if cancel.is_cancelled() {
                return Err(CortexError::Cancelled);
            }

            let mut reports = Vec::with_capacity(results.len());
            for (task, outcome, result) in results {
                let role = outcome
                    .as_ref()
                    .map_or_else(|| "unknown".to_string(), |o| o.role.to_string());
                outcomes.extend(outcome);
                reports.push(SpecialistReport {
                    name: task.agent.clone(),
                    role,
                    result,
                });
            }
            messages.push(ChatMessage::assistant(output));
            messages.push(ChatMessage::user(format_specialist_results(&reports)));
        };
        life.advance(OrchestrationState::Aggregating)?;

        Ok(OrchestrationResult {
            request_id: life.request_id.clone(),
            strategy: Strategy::Leader,
            reply,
            outcomes,
            failed_stage: None,
            delegation_rounds: rounds,
            transitions: Vec::new(),
        })
    }

    async fn run_parallel(
        &self,
        request: &OrchestrationRequest,
        agents: Vec<Agent>,
        life: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, CortexError> {
        life.advance(OrchestrationState::Dispatched)?;
        let calls = agents.iter().map(|agent| {
            self.call_agent(
                request,
                agent,
                combine_prompts(&agent.system_prompt, request.system_prompt.as_deref()),
                with_user_message(&request.history, request.message.clone()),
                cancel,
            )
        });
        life.advance(OrchestrationState::AwaitingAgents)?;
        let results = join_all(calls).await;
        if cancel.is_cancelled() {
            return Err(CortexError::Cancelled);
        }
        life.advance(OrchestrationState::Aggregating)?;

        let outcomes: Vec<AgentOutcome> = agents
            .iter()
            .zip(&results)
            .map(|(agent, result)| AgentOutcome::new(agent, result))
            .collect();
        let successful: Vec<&AgentOutcome> = outcomes.iter().filter(|o| o.success).collect();
        let reply = match successful.as_slice() {
            [] => {
                return Err(CortexError::OrchestrationFailed {
                    message: format!("all {} agents failed", outcomes.len()),
                });
            }
            [only] => only.content.clone(),
            many => many
                .iter()
                .map(|o| format!("**{}** ({}):\n{}", o.agent_name, o.role, o.content))
                .collect::<Vec<_>>()
                .join("\n\n"),
        };

        Ok(OrchestrationResult {
            request_id: life.request_id.clone(),
            strategy: Strategy::Parallel,
            reply,
            outcomes,
            failed_stage: None,
            delegation_rounds: 0,
            transitions: Vec::new(),
        })
    }

    async fn run_chain(
        &self,
        request: &OrchestrationRequest,
        mut agents: Vec<Agent>,
        life: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult, CortexError> {
        if request.agent_ids.is_none() {
            agents.sort_by_key(|a| a.role.chain_rank());
        }

        let mut outcomes = Vec::with_capacity(agents.len());
        let mut accumulated = String::new();
        let mut reply = None;
        let mut failed_stage = None;
        for (stage, agent) in agents.iter().enumerate() {
            let prompt = if accumulated.is_empty() {
                request.message.clone()
            } else {
                format!(
                    "{}\n\nContext from previous analysis:{accumulated}",
                    request.message
                )
            };
            life.advance(OrchestrationState::Dispatched)?;
            let call = self.call_agent(
                request,
                agent,
                combine_prompts(&agent.system_prompt, request.system_prompt.as_deref()),
                with_user_message(&request.history, prompt),
                cancel,
            );
            life.advance(OrchestrationState::AwaitingAgents)?;
            let result = call.await;
            if matches!(result, Err(CortexError::Cancelled)) {
                return Err(CortexError::Cancelled);
            }
            outcomes.push(AgentOutcome::new(agent, &result));
            match result {
                Ok(output) => {
                    accumulated.push_str(&format!("\n\n[{} ({})]:\n{}", agent.name, agent.role, output));
                    reply = Some(output);
                }
                Err(e) => {
                    warn!(tenant = %request.tenant, stage, agent = %agent.name, error = %e, "chain halted");
                    failed_stage = Some(stage);
                    break;
                }
            }
        }

        let Some(reply) = reply else {
            return Err(CortexError::OrchestrationFailed {
                message: "the first chain stage failed".to_string(),
            });
        };
        life.advance(OrchestrationState::Aggregating)?;
        Ok(OrchestrationResult {
            request_id: life.request_id.clone(),
            strategy: Strategy::Chain,
            reply,
            outcomes,
            failed_stage,
            delegation_rounds: 0,
            transitions: Vec::new(),
        })
    }

    /// Open a streamed answer from one agent.
    pub async fn stream_agent(
        &self,
        tenant: &TenantId,
        agent: Agent,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentStream, CortexError> {
        let permit = self.acquire(tenant, cancel).await?;
        let deadline = self.call_deadline();
        let open = async {
            let provider = self.resolver.resolve(&agent).await?;
            provider.generate_stream(request).await
        };
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CortexError::Cancelled),
            opened = tokio::time::timeout(deadline, open) => match opened {
                Ok(stream) => stream?,
                Err(_) => return Err(deadline_exceeded(&agent, deadline)),
            },
        };
        Ok(AgentStream {
            agent,
            stream,
            deadline,
            _permit: permit,
        })
    }
}

fn pick_single(
    agents: Vec<Agent>,
    agent_id: Option<&str>,
    role: Option<AgentRole>,
) -> Result<Agent, CortexError> {
    if let Some(id) = agent_id {
        return agents
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| CortexError::NotFound {
                entity: "active agent".to_string(),
                id: id.to_string(),
            });
    }
    if let Some(role) = role {
        return agents
            .into_iter()
            .find(|a| a.role == role)
            .ok_or_else(|| CortexError::NotFound {
                entity: "agent with role".to_string(),
                id: role.to_string(),
            });
    }
    let leader = agents.iter().position(|a| a.role == AgentRole::Leader).unwrap_or(0);
    agents
        .into_iter()
        .nth(leader)
        .ok_or_else(|| CortexError::OrchestrationFailed {
            message: "no active agents are configured".to_string(),
        })
}

/// Narrow the active agents to `ids`, in the listed order.
fn pick_listed(agents: Vec<Agent>, ids: Option<&[String]>) -> Result<Vec<Agent>, CortexError> {
    let Some(ids) = ids else {
        return Ok(agents);
    };
    if ids.is_empty() {
        return Err(CortexError::Validation("agent_ids must not be empty".to_string()));
    }
    let mut picked: Vec<Agent> = Vec::with_capacity(ids.len());
    for id in ids {
        if picked.iter().any(|a| &a.id == id) {
            return Err(CortexError::Validation(format!("agent `{id}` is listed twice")));
        }
        let agent = agents
            .iter()
            .find(|a| &a.id == id)
            .ok_or_else(|| CortexError::NotFound {
                entity: "active agent".to_string(),
                id: id.clone(),
            })?;
        picked.push(agent.clone());
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use OrchestrationState::*;

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!(Strategy::from_str("Chain").unwrap(), Strategy::Chain);
        assert_eq!(Strategy::Parallel.to_string(), "parallel");
        assert!(Strategy::from_str("round_robin").is_err());
    }

    #[test]
    fn lifecycle_follows_the_happy_path() {
        let mut life = Lifecycle::new();
        for next in [Dispatched, AwaitingAgents, Dispatched, AwaitingAgents, Aggregating, Done] {
            life.advance(next).unwrap();
        }
        assert_eq!(life.state, Done);
        assert_eq!(life.history.len(), 7);
    }

    #[test]
    fn lifecycle_rejects_skipped_states() {
        let mut life = Lifecycle::new();
        assert!(life.advance(Aggregating).is_err());
        assert!(life.advance(Done).is_err());
        life.advance(Dispatched).unwrap();
        assert!(life.advance(Done).is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Dispatched));
        assert!(AwaitingAgents.can_advance_to(Failed));

        let mut life = Lifecycle::new();
        life.fail();
        life.fail();
        assert_eq!(life.history, vec![Received, Failed]);
    }

    #[test]
    fn states_render_in_screaming_case() {
        assert_eq!(AwaitingAgents.to_string(), "AWAITING_AGENTS");
    }

    #[test]
    fn prompts_combine_agent_first() {
        assert_eq!(combine_prompts("Agent.", Some("Memory.")).unwrap(), "Agent.\n\nMemory.");
        assert_eq!(combine_prompts("", Some("Memory.")).unwrap(), "Memory.");
        assert_eq!(combine_prompts("Agent.", None).unwrap(), "Agent.");
        assert!(combine_prompts(" ", Some("")).is_none());
    }
}
