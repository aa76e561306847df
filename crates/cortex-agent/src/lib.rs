// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agents, orchestration and the chat engine for Cortex.
//!
//! The [`Engine`] is the entry point: it resolves the session, recalls
//! memories, assembles the system prompt, runs the [`Orchestrator`] over the
//! tenant's agents and queues the exchange for memory extraction.

pub mod delegation;
pub mod engine;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod suggestions;

pub use engine::{
    provider_from_config, ChatEvent, ChatReply, ChatRequest, Engine, EngineBuilder,
    HealthReport, MaintenanceReport,
};
pub use orchestrator::{
    AgentOutcome, AgentStream, OrchestrationRequest, OrchestrationResult, OrchestrationState,
    Orchestrator, Strategy,
};
pub use prompts::{ChatContext, PromptBuilder, ResponseStyle, SchemaHint, UserContext};
pub use registry::{Agent, AgentRegistry, AgentUpdate, NewAgent};
pub use resolver::{ConfiguredResolver, ProviderResolver};
pub use scheduler::{run_scheduler, spawn_scheduler};
pub use session::SessionManager;
pub use shutdown::{drain, install_signal_handler};
pub use suggestions::{Suggestion, SuggestionCatalog, SuggestionSet};
