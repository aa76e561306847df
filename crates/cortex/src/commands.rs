// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot subcommands: chat, extraction, status, agent and memory admin.

use std::io::Write;
use std::time::Duration;

use cortex_agent::{
    install_signal_handler, ChatEvent, ChatRequest, HealthReport, NewAgent, ResponseStyle, Strategy,
};
use cortex_config::CortexConfig;
use cortex_core::types::{AgentRole, ProviderKind};
use cortex_core::{CortexError, HealthStatus, TenantId};
use cortex_memory::{ExtractionStatus, MemoryInput};
use secrecy::SecretString;
use serde::Serialize;

use crate::runtime::{open_engine, VaultAccess};

/// How long a one-shot command waits for inline extraction before exiting.
const EXIT_DRAIN: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct ChatArgs {
    pub tenant: String,
    pub session: Option<String>,
    pub strategy: Option<Strategy>,
    pub agent: Option<String>,
    pub agents: Vec<String>,
    pub style: Option<ResponseStyle>,
    pub stream: bool,
    pub message: String,
}

#[derive(Debug)]
pub struct AddAgentArgs {
    pub tenant: String,
    pub name: String,
    pub role: AgentRole,
    pub provider: ProviderKind,
    pub model: String,
    pub system_prompt: Option<String>,
    pub api_key_env: Option<String>,
}

pub async fn run_chat(config: CortexConfig, args: ChatArgs) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::IfPresent).await?;
    let tenant = TenantId::from(args.tenant);
    let request = ChatRequest {
        message: args.message,
        session_id: args.session,
        strategy: args.strategy,
        style: args.style,
        agent_id: args.agent,
        agent_ids: (!args.agents.is_empty()).then_some(args.agents),
        ..ChatRequest::default()
    };
    let cancel = install_signal_handler();

    let result = if args.stream {
        let mut events = engine.handle_chat_stream(&tenant, request, cancel.clone()).await?;
        let mut stdout = std::io::stdout();
        let mut outcome = Ok(());
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::Chunk(text) => {
                    print!("{text}");
                    let _ = stdout.flush();
                }
                ChatEvent::Done { session_id } => {
                    println!();
                    eprintln!("session: {session_id}");
                }
                ChatEvent::Error(e) => {
                    println!();
                    outcome = Err(e);
                }
            }
        }
        outcome
    } else {
        engine.handle_chat(&tenant, request, cancel.clone()).await.map(|reply| {
            println!("{}", reply.reply);
            let failed = reply.outcomes.iter().filter(|o| !o.success).count();
            eprintln!(
                "session: {} | strategy: {} | agents: {} ({} failed) | memories: {}",
                reply.session_id,
                reply.strategy,
                reply.outcomes.len(),
                failed,
                reply.memories_used
            );
        })
    };

    cancel.cancel();
    engine.shutdown(EXIT_DRAIN).await;
    result
}

pub async fn run_extract(config: CortexConfig, limit: Option<usize>) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::IfPresent).await?;
    let report = engine.run_extraction(limit).await?;
    println!(
        "extraction: {} turns, {} completed, {} skipped, {} failed, {} released; \
         {} memories created, {} updated",
        report.total,
        report.completed,
        report.skipped,
        report.failed,
        report.released,
        report.memories_created,
        report.memories_updated
    );
    Ok(())
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
struct StatusOutput {
    health: HealthReport,
    extraction: Option<ExtractionStatus>,
}

fn health_label(status: &HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Degraded(detail) => format!("degraded ({detail})"),
        HealthStatus::Unhealthy(detail) => format!("unhealthy ({detail})"),
    }
}

fn render_status(output: &StatusOutput) -> String {
    let h = &output.health;
    let mut lines = vec![
        format!("status:      {}", health_label(&h.status)),
        format!("database:    {}", health_label(&h.database)),
        format!("embeddings:  {}", health_label(&h.embedding_provider)),
        format!(
            "memory:      {}",
            if h.memory_enabled { "enabled" } else { "disabled" }
        ),
        format!(
            "cache:       {}/{} entries, hit rate {:.1}%",
            h.cache.size,
            h.cache.capacity,
            h.cache.hit_rate * 100.0
        ),
        format!("sessions:    {}", h.active_sessions),
    ];
    match &output.extraction {
        Some(x) if x.extraction_enabled => lines.push(format!(
            "extraction:  {} mode, {} pending, {} processing, {} failed",
            x.mode.as_str(),
            x.pending_count,
            x.processing_count,
            x.failed_count
        )),
        _ => lines.push("extraction:  disabled".to_string()),
    }
    lines.join("\n")
}

pub async fn run_status(config: CortexConfig, json: bool) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::Skip).await?;
    let output = StatusOutput {
        health: engine.health().await,
        extraction: engine.extraction_status().await.ok(),
    };
    if json {
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| CortexError::Internal(format!("failed to encode status: {e}")))?;
        println!("{text}");
    } else {
        println!("{}", render_status(&output));
    }
    Ok(())
}

pub async fn list_agents(config: CortexConfig, tenant: &str, all: bool) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::Skip).await?;
    let agents = engine.list_agents(&TenantId::from(tenant), !all).await?;
    if agents.is_empty() {
        println!("no agents for tenant `{tenant}`");
        return Ok(());
    }
    for agent in agents {
        println!(
            "{}  {:<16} {:<10} {}/{}{}",
            agent.id,
            agent.name,
            agent.role,
            agent.provider,
            agent.model,
            if agent.enabled { "" } else { "  (disabled)" }
        );
    }
    Ok(())
}

fn read_api_key(var: &str) -> Result<SecretString, CortexError> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(SecretString::from(key)),
        _ => Err(CortexError::Validation(format!(
            "environment variable `{var}` is not set"
        ))),
    }
}

pub async fn add_agent(config: CortexConfig, args: AddAgentArgs) -> Result<(), CortexError> {
    let api_key = args.api_key_env.as_deref().map(read_api_key).transpose()?;
    let access = if api_key.is_some() {
        VaultAccess::Required
    } else {
        VaultAccess::Skip
    };
    let engine = open_engine(config, access).await?;

    let mut agent = NewAgent::new(args.name, args.role, args.provider, args.model);
    agent.system_prompt = args.system_prompt.unwrap_or_default();
    agent.api_key = api_key;
    let created = engine.create_agent(&TenantId::from(args.tenant), agent).await?;
    println!("{}", created.id);
    Ok(())
}

pub async fn remove_agent(config: CortexConfig, tenant: &str, id: &str) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::IfPresent).await?;
    engine.delete_agent(&TenantId::from(tenant), id).await?;
    println!("removed agent {id}");
    Ok(())
}

pub async fn search_memory(
    config: CortexConfig,
    tenant: &str,
    query: &str,
    limit: Option<usize>,
) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::Skip).await?;
    let results = engine
        .search_memory(&TenantId::from(tenant), query, limit, None)
        .await?;
    if results.is_empty() {
        println!("no matching memories");
    }
    for scored in results {
        let marker = if scored.critical { " *" } else { "" };
        println!(
            "{:.3}{marker}  {}  [{}]",
            scored.similarity, scored.memory.content, scored.memory.id
        );
    }
    Ok(())
}

pub async fn store_memory(
    config: CortexConfig,
    tenant: &str,
    content: String,
    importance: Option<f32>,
) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::Skip).await?;
    let mut input = MemoryInput::new(content);
    if let Some(importance) = importance {
        input.importance = importance;
    }
    let stored = engine.store_memory(&TenantId::from(tenant), input).await?;
    println!("{} ({:?})", stored.id, stored.outcome);
    Ok(())
}

pub async fn clear_memory(
    config: CortexConfig,
    tenant: &str,
    session: Option<&str>,
) -> Result<(), CortexError> {
    let engine = open_engine(config, VaultAccess::Skip).await?;
    let removed = engine.clear_memory(&TenantId::from(tenant), session).await?;
    println!("removed {removed} memories");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_config::ExtractionMode;
    use cortex_memory::CacheStats;

    fn report(status: HealthStatus) -> HealthReport {
        HealthReport {
            status,
            database: HealthStatus::Healthy,
            memory_enabled: true,
            extraction_enabled: true,
            extraction_mode: ExtractionMode::Batch,
            cache: CacheStats {
                size: 3,
                capacity: 10,
                hits: 1,
                misses: 1,
                evictions: 0,
                hit_rate: 0.5,
            },
            pending_extraction: Some(2),
            embedding_provider: HealthStatus::Degraded("slow".into()),
            active_sessions: 4,
        }
    }

    #[test]
    fn status_lists_components() {
        let output = StatusOutput {
            health: report(HealthStatus::Healthy),
            extraction: Some(ExtractionStatus {
                pending_count: 2,
                processing_count: 1,
                failed_count: 0,
                extraction_enabled: true,
                mode: ExtractionMode::Batch,
                batch_size: 20,
            }),
        };
        let text = render_status(&output);
        assert!(text.contains("status:      healthy"));
        assert!(text.contains("embeddings:  degraded (slow)"));
        assert!(text.contains("3/10 entries, hit rate 50.0%"));
        assert!(text.contains("batch mode, 2 pending, 1 processing, 0 failed"));
    }

    #[test]
    fn status_without_extraction_says_disabled() {
        let output = StatusOutput {
            health: report(HealthStatus::Unhealthy("db".into())),
            extraction: None,
        };
        let text = render_status(&output);
        assert!(text.contains("unhealthy (db)"));
        assert!(text.contains("extraction:  disabled"));
    }

    #[test]
    fn status_json_shape() {
        let output = StatusOutput {
            health: report(HealthStatus::Healthy),
            extraction: None,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["health"]["active_sessions"], 4);
        assert_eq!(json["health"]["cache"]["capacity"], 10);
        assert!(json["extraction"].is_null());
    }

    #[test]
    fn missing_key_variable_is_a_validation_error() {
        let err = read_api_key("CORTEX_TEST_SURELY_UNSET_KEY").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
