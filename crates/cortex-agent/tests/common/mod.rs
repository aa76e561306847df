// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared harness: a migrated in-memory database, an agent registry and a
//! resolver that maps agent names to scripted mock providers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cortex_agent::{Agent, AgentRegistry, Engine, NewAgent, ProviderResolver};
use cortex_config::CortexConfig;
use cortex_core::types::{AgentRole, ProviderKind};
use cortex_core::{CortexError, ProviderAdapter, TenantId};
use cortex_storage::Database;
use cortex_test_utils::{test_db, MemorySecretStore, MockProvider};

/// Resolves agents by name; unknown names get a shared default mock.
pub struct MapResolver {
    providers: Mutex<HashMap<String, Arc<MockProvider>>>,
    fallback: Arc<MockProvider>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
            fallback: Arc::new(MockProvider::new("fallback")),
        }
    }

    pub fn insert(&self, agent_name: &str, provider: Arc<MockProvider>) {
        self.providers
            .lock()
            .unwrap()
            .insert(agent_name.to_string(), provider);
    }
}

#[async_trait]
impl ProviderResolver for MapResolver {
    async fn resolve(&self, agent: &Agent) -> Result<Arc<dyn ProviderAdapter>, CortexError> {
        let provider = self
            .providers
            .lock()
            .unwrap()
            .get(&agent.name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback));
        Ok(provider)
    }
}

pub struct Fixture {
    pub db: Database,
    pub registry: AgentRegistry,
    pub resolver: Arc<MapResolver>,
    pub tenant: TenantId,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = test_db().await.unwrap();
        let registry = AgentRegistry::new(db.clone(), Arc::new(MemorySecretStore::new()));
        Self {
            db,
            registry,
            resolver: Arc::new(MapResolver::new()),
            tenant: TenantId::from("acme"),
        }
    }

    /// Register an agent for the fixture tenant, answered by `provider`.
    pub async fn agent(
        &self,
        name: &str,
        role: AgentRole,
        provider: MockProvider,
    ) -> (Agent, Arc<MockProvider>) {
        self.agent_with_prompt(name, role, "", provider).await
    }

    pub async fn agent_with_prompt(
        &self,
        name: &str,
        role: AgentRole,
        system_prompt: &str,
        provider: MockProvider,
    ) -> (Agent, Arc<MockProvider>) {
        let mut new = NewAgent::new(name, role, ProviderKind::Ollama, "test-model");
        new.system_prompt = system_prompt.to_string();
        let agent = self.registry.create(&self.tenant, new).await.unwrap();
        let provider = Arc::new(provider);
        self.resolver.insert(name, Arc::clone(&provider));
        (agent, provider)
    }
}

/// An engine over the fixture's database, with `embedder` serving both
/// embeddings and extraction.
pub fn engine(fixture: &Fixture, config: CortexConfig, embedder: Arc<MockProvider>) -> Arc<Engine> {
    engine_with_extractor(fixture, config, Arc::clone(&embedder), embedder)
}

pub fn engine_with_extractor(
    fixture: &Fixture,
    config: CortexConfig,
    embedder: Arc<MockProvider>,
    extractor: Arc<MockProvider>,
) -> Arc<Engine> {
    let secrets = Arc::new(MemorySecretStore::new());
    let engine = Engine::builder(config, fixture.db.clone(), secrets)
        .embedder(embedder)
        .extractor(extractor)
        .resolver(Arc::clone(&fixture.resolver) as Arc<dyn ProviderResolver>)
        .build()
        .unwrap();
    Arc::new(engine)
}
