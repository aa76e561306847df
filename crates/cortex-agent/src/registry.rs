// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped catalog of configured agents.
//!
//! API keys are handed to the [`SecretStore`] on write; the table only keeps
//! the opaque reference, and [`Agent`] only exposes whether one exists.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use cortex_core::types::{AgentRole, ProviderKind};
use cortex_core::{CortexError, SecretStore, TenantId};
use cortex_storage::{map_tr_err, Database};
use rusqlite::{params, OptionalExtension, Row};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const AGENT_COLUMNS: &str = "id, tenant_id, name, role, provider, model, system_prompt, \
     credential_ref, base_url, max_tokens, temperature, enabled, created_at, updated_at";

pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// A configured agent as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub role: AgentRole,
    pub provider: ProviderKind,
    pub model: String,
    pub system_prompt: String,
    /// Overrides the configured endpoint of the provider.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub enabled: bool,
    pub has_credential: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`AgentRegistry::create`].
#[derive(Debug, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub role: AgentRole,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl NewAgent {
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        provider: ProviderKind,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            provider,
            model: model.into(),
            system_prompt: String::new(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub role: Option<AgentRole>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Replaces the stored key.
    pub api_key: Option<SecretString>,
    /// Drops the stored key. Ignored when `api_key` is set.
    #[serde(default)]
    pub remove_api_key: bool,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub enabled: Option<bool>,
}

struct AgentRow {
    agent: Agent,
    credential_ref: Option<String>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_time(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn row_to_agent(row: &Row<'_>) -> Result<AgentRow, rusqlite::Error> {
    let role: String = row.get(3)?;
    let provider: String = row.get(4)?;
    let credential_ref: Option<String> = row.get(7)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    Ok(AgentRow {
        agent: Agent {
            id: row.get(0)?,
            tenant_id: TenantId::new(row.get::<_, String>(1)?),
            name: row.get(2)?,
            role: AgentRole::from_str(&role).map_err(|e| conversion_err(3, e))?,
            provider: ProviderKind::from_str(&provider).map_err(|e| conversion_err(4, e))?,
            model: row.get(5)?,
            system_prompt: row.get(6)?,
            base_url: row.get(8)?,
            max_tokens: row.get(9)?,
            temperature: row.get(10)?,
            enabled: row.get(11)?,
            has_credential: credential_ref.is_some(),
            created_at: parse_time(12, &created_at)?,
            updated_at: parse_time(13, &updated_at)?,
        },
        credential_ref,
    })
}

fn validate_name(name: &str) -> Result<String, CortexError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(CortexError::Validation(
            "agent name must be 1 to 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_model(model: &str) -> Result<String, CortexError> {
    let model = model.trim();
    if model.is_empty() {
        return Err(CortexError::Validation("agent model must not be empty".to_string()));
    }
    Ok(model.to_string())
}

fn validate_sampling(max_tokens: u32, temperature: f32) -> Result<(), CortexError> {
    if max_tokens == 0 {
        return Err(CortexError::Validation("max_tokens must be positive".to_string()));
    }
    if !(0.0..=2.0).contains(&temperature) {
        return Err(CortexError::Validation(format!(
            "temperature {temperature} must be within [0, 2]"
        )));
    }
    Ok(())
}

fn not_found(id: &str) -> CortexError {
    CortexError::NotFound {
        entity: "agent".to_string(),
        id: id.to_string(),
    }
}

#[derive(Clone)]
pub struct AgentRegistry {
    db: Database,
    secrets: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry").finish_non_exhaustive()
    }
}

impl AgentRegistry {
    pub fn new(db: Database, secrets: Arc<dyn SecretStore>) -> Self {
        Self { db, secrets }
    }

    pub async fn create(&self, tenant: &TenantId, new: NewAgent) -> Result<Agent, CortexError> {
        let name = validate_name(&new.name)?;
        let model = validate_model(&new.model)?;
        let max_tokens = new.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = new.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        validate_sampling(max_tokens, temperature)?;
        if self.find_by_name(tenant, &name).await?.is_some() {
            return Err(CortexError::Validation(format!(
                "an agent named `{name}` already exists"
            )));
        }

        let credential_ref = match &new.api_key {
            Some(key) => Some(self.secrets.put(key).await?),
            None => None,
        };
        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());
        let row = (
            id.clone(),
            tenant.as_str().to_string(),
            name,
            new.role.as_ref().to_string(),
            new.provider.as_ref().to_string(),
            model,
            new.system_prompt,
            credential_ref.clone(),
            new.base_url,
        );
        let inserted = self
            .db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    &format!(
                        "INSERT INTO agents ({AGENT_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?12)"
                    ),
                    params![
                        row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8,
                        max_tokens, temperature, now
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err);
        if let Err(e) = inserted {
            // Do not leave an orphaned secret behind.
            if let Some(reference) = &credential_ref {
                self.secrets.delete(reference).await?;
            }
            return Err(e);
        }

        let agent = self.get(tenant, &id).await?;
        info!(tenant = %tenant, agent = %agent.name, provider = %agent.provider, role = %agent.role, "agent created");
        Ok(agent)
    }

    pub async fn get(&self, tenant: &TenantId, id: &str) -> Result<Agent, CortexError> {
        self.fetch(tenant, id)
            .await?
            .map(|row| row.agent)
            .ok_or_else(|| not_found(id))
    }

    /// Agents of the tenant, oldest first.
    pub async fn list(&self, tenant: &TenantId, active_only: bool) -> Result<Vec<Agent>, CortexError> {
        let tenant = tenant.as_str().to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<Agent>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {AGENT_COLUMNS} FROM agents
                     WHERE tenant_id = ?1 AND (?2 = 0 OR enabled = 1)
                     ORDER BY created_at ASC, rowid ASC"
                ))?;
                let agents = stmt
                    .query_map(params![tenant, active_only], row_to_agent)?
                    .map(|row| row.map(|r| r.agent))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(agents)
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn update(
        &self,
        tenant: &TenantId,
        id: &str,
        update: AgentUpdate,
    ) -> Result<Agent, CortexError> {
        let current = self.fetch(tenant, id).await?.ok_or_else(|| not_found(id))?;
        let mut agent = current.agent;

        if let Some(name) = update.name {
            let name = validate_name(&name)?;
            if name != agent.name
                && self
                    .find_by_name(tenant, &name)
                    .await?
                    .is_some_and(|other| other != agent.id)
            {
                return Err(CortexError::Validation(format!(
                    "an agent named `{name}` already exists"
                )));
            }
            agent.name = name;
        }
        if let Some(model) = update.model {
            agent.model = validate_model(&model)?;
        }
        if let Some(role) = update.role {
            agent.role = role;
        }
        if let Some(prompt) = update.system_prompt {
            agent.system_prompt = prompt;
        }
        if let Some(base_url) = update.base_url {
            agent.base_url = (!base_url.trim().is_empty()).then_some(base_url);
        }
        if let Some(enabled) = update.enabled {
            agent.enabled = enabled;
        }
        agent.max_tokens = update.max_tokens.unwrap_or(agent.max_tokens);
        agent.temperature = update.temperature.unwrap_or(agent.temperature);
        validate_sampling(agent.max_tokens, agent.temperature)?;

        let old_ref = current.credential_ref;
        let credential_ref = match (&update.api_key, update.remove_api_key) {
            (Some(key), _) => Some(self.secrets.put(key).await?),
            (None, true) => None,
            (None, false) => old_ref.clone(),
        };

        let now = timestamp(Utc::now());
        let row = (
            agent.id.clone(),
            agent.tenant_id.as_str().to_string(),
            agent.name.clone(),
            agent.role.as_ref().to_string(),
            agent.model.clone(),
            agent.system_prompt.clone(),
            credential_ref.clone(),
            agent.base_url.clone(),
        );
        let (max_tokens, temperature, enabled) = (agent.max_tokens, agent.temperature, agent.enabled);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE agents SET name = ?3, role = ?4, model = ?5, system_prompt = ?6,
                         credential_ref = ?7, base_url = ?8, max_tokens = ?9,
                         temperature = ?10, enabled = ?11, updated_at = ?12
                     WHERE id = ?1 AND tenant_id = ?2",
                    params![
                        row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, max_tokens,
                        temperature, enabled, now
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        if let Some(old) = old_ref.filter(|old| credential_ref.as_ref() != Some(old)) {
            self.secrets.delete(&old).await?;
        }
        debug!(tenant = %tenant, agent = %agent.name, "agent updated");
        self.get(tenant, id).await
    }

    /// Delete an agent together with its stored credential.
    pub async fn delete(&self, tenant: &TenantId, id: &str) -> Result<(), CortexError> {
        let row = self.fetch(tenant, id).await?.ok_or_else(|| not_found(id))?;
        let (tenant_str, id_owned) = (tenant.as_str().to_string(), id.to_string());
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM agents WHERE id = ?1 AND tenant_id = ?2",
                    params![id_owned, tenant_str],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if let Some(reference) = row.credential_ref {
            self.secrets.delete(&reference).await?;
        }
        info!(tenant = %tenant, agent = %row.agent.name, "agent deleted");
        Ok(())
    }

    /// Decrypted API key of an agent, for building its provider client.
    pub async fn credential(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<SecretString>, CortexError> {
        let row = self.fetch(tenant, id).await?.ok_or_else(|| not_found(id))?;
        match row.credential_ref {
            Some(reference) => self.secrets.get(&reference).await,
            None => Ok(None),
        }
    }

    async fn fetch(&self, tenant: &TenantId, id: &str) -> Result<Option<AgentRow>, CortexError> {
        let tenant = tenant.as_str().to_string();
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<AgentRow>, rusqlite::Error> {
                conn.query_row(
                    &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE tenant_id = ?1 AND id = ?2"),
                    params![tenant, id],
                    row_to_agent,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn find_by_name(&self, tenant: &TenantId, name: &str) -> Result<Option<String>, CortexError> {
        let tenant = tenant.as_str().to_string();
        let name = name.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT id FROM agents WHERE tenant_id = ?1 AND name = ?2",
                    params![tenant, name],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }
}
