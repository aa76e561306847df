// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning an agent definition into a live provider client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cortex_config::model::ProvidersConfig;
use cortex_core::{CortexError, ProviderAdapter};
use cortex_providers::{Provider, RetryPolicy};
use dashmap::DashMap;
use tracing::debug;

use crate::registry::{Agent, AgentRegistry};

/// Supplies the provider an agent talks to.
#[async_trait]
pub trait ProviderResolver: Send + Sync + 'static {
    async fn resolve(&self, agent: &Agent) -> Result<Arc<dyn ProviderAdapter>, CortexError>;
}

/// Builds [`Provider`] clients from configuration plus the agent's own
/// endpoint override and vault credential.
///
/// Clients are reused until the agent record changes.
pub struct ConfiguredResolver {
    registry: AgentRegistry,
    providers: ProvidersConfig,
    retry: RetryPolicy,
    clients: DashMap<String, (DateTime<Utc>, Arc<Provider>)>,
}

impl ConfiguredResolver {
    pub fn new(registry: AgentRegistry, providers: ProvidersConfig, retry: RetryPolicy) -> Self {
        Self {
            registry,
            providers,
            retry,
            clients: DashMap::new(),
        }
    }
}

#[async_trait]
impl ProviderResolver for ConfiguredResolver {
    async fn resolve(&self, agent: &Agent) -> Result<Arc<dyn ProviderAdapter>, CortexError> {
        if let Some(entry) = self.clients.get(&agent.id)
            && entry.0 == agent.updated_at
        {
            let client: Arc<dyn ProviderAdapter> = entry.1.clone();
            return Ok(client);
        }

        let mut settings = self
            .providers
            .get(agent.provider.as_ref())
            .cloned()
            .ok_or_else(|| {
                CortexError::Config(format!("no settings for provider `{}`", agent.provider))
            })?;
        if let Some(base_url) = &agent.base_url {
            settings.base_url = base_url.clone();
        }
        let key = self.registry.credential(&agent.tenant_id, &agent.id).await?;
        if key.is_none() && agent.provider.requires_credential() {
            return Err(CortexError::InvalidCredential {
                provider: agent.provider.to_string(),
                message: format!("agent `{}` has no API key", agent.name),
            });
        }

        let client = Arc::new(Provider::from_settings(agent.provider, &settings, key, self.retry)?);
        debug!(agent = %agent.name, provider = %agent.provider, "provider client built");
        self.clients
            .insert(agent.id.clone(), (agent.updated_at, Arc::clone(&client)));
        Ok(client)
    }
}
