// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store with vector BLOBs.
//!
//! Every query is tenant-scoped. Expiry is evaluated against the caller's
//! clock so tests can pin "now".

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use cortex_core::{CortexError, TenantId};
use cortex_storage::{map_tr_err, Database};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::types::{
    blob_to_vec, clamp_importance, vec_to_blob, Memory, MemoryType, NewMemory, UpsertOutcome,
};

const MEMORY_COLUMNS: &str = "id, tenant_id, subject, predicate, object, content, object_type, \
     memory_type, importance, confidence, tags, embedding, embedding_model, source_turn_id, \
     session_id, created_at, updated_at, expires_at";

/// Fixed-width RFC 3339 so timestamps compare correctly as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
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

fn row_to_memory(row: &Row<'_>) -> Result<Memory, rusqlite::Error> {
    let memory_type: String = row.get(7)?;
    let tags: String = row.get(10)?;
    let embedding: Option<Vec<u8>> = row.get(11)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;
    let expires_at: Option<String> = row.get(17)?;
    Ok(Memory {
        id: row.get(0)?,
        tenant_id: TenantId::new(row.get::<_, String>(1)?),
        subject: row.get(2)?,
        predicate: row.get(3)?,
        object: row.get(4)?,
        content: row.get(5)?,
        object_type: row.get(6)?,
        memory_type: MemoryType::from_str(&memory_type).map_err(|e| conversion_err(7, e))?,
        importance: row.get(8)?,
        confidence: row.get(9)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_err(10, e))?,
        embedding: embedding.as_deref().map(blob_to_vec).unwrap_or_default(),
        embedding_model: row.get(12)?,
        source_turn_id: row.get(13)?,
        session_id: row.get(14)?,
        created_at: parse_time(15, &created_at)?,
        updated_at: parse_time(16, &updated_at)?,
        expires_at: expires_at.as_deref().map(|s| parse_time(17, s)).transpose()?,
    })
}

/// Durable, tenant-partitioned repository of memories.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a memory, or overwrite content, scores, vector and expiry of the
    /// existing one with the same `(subject, predicate, object)`.
    ///
    /// Runs in one transaction. Importance is clamped into `[0, 1]`.
    pub async fn upsert(&self, memory: NewMemory) -> Result<(String, UpsertOutcome), CortexError> {
        let now = timestamp(Utc::now());
        let tags = serde_json::to_string(&memory.tags).map_err(|e| CortexError::Storage {
            source: Box::new(e),
        })?;
        let blob = (!memory.embedding.is_empty()).then(|| vec_to_blob(&memory.embedding));
        let importance = clamp_importance(memory.importance);
        let confidence = clamp_importance(memory.confidence);
        let expires_at = memory.expires_at.map(timestamp);
        let memory_type = memory.memory_type.as_ref().to_string();

        let result = self
            .db
            .connection()
            .call(move |conn| -> Result<(String, UpsertOutcome), rusqlite::Error> {
                let tx = conn.transaction()?;
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM memories
                         WHERE tenant_id = ?1 AND subject = ?2 AND predicate = ?3 AND object = ?4",
                        params![
                            memory.tenant_id.as_str(),
                            memory.subject,
                            memory.predicate,
                            memory.object
                        ],
                        |row| row.get(0),
                    )
                    .optional()?;
                let outcome = match existing {
                    Some(id) => {
                        tx.execute(
                            "UPDATE memories SET content = ?2, object_type = ?3, memory_type = ?4,
                                 importance = ?5, confidence = ?6, tags = ?7, embedding = ?8,
                                 embedding_model = ?9, source_turn_id = ?10, session_id = ?11,
                                 expires_at = ?12, updated_at = ?13
                             WHERE id = ?1",
                            params![
                                id,
                                memory.content,
                                memory.object_type,
                                memory_type,
                                importance,
                                confidence,
                                tags,
                                blob,
                                memory.embedding_model,
                                memory.source_turn_id,
                                memory.session_id,
                                expires_at,
                                now
                            ],
                        )?;
                        (id, UpsertOutcome::Updated)
                    }
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        tx.execute(
                            &format!(
                                "INSERT INTO memories ({MEMORY_COLUMNS})
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                                         ?13, ?14, ?15, ?16, ?16, ?17)"
                            ),
                            params![
                                id,
                                memory.tenant_id.as_str(),
                                memory.subject,
                                memory.predicate,
                                memory.object,
                                memory.content,
                                memory.object_type,
                                memory_type,
                                importance,
                                confidence,
                                tags,
                                blob,
                                memory.embedding_model,
                                memory.source_turn_id,
                                memory.session_id,
                                now,
                                expires_at
                            ],
                        )?;
                        (id, UpsertOutcome::Created)
                    }
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(id = %result.0, outcome = ?result.1, "memory upserted");
        Ok(result)
    }

    /// Fetch one memory. Memories of other tenants are invisible.
    pub async fn get(&self, tenant: &TenantId, id: &str) -> Result<Option<Memory>, CortexError> {
        let tenant = tenant.as_str().to_string();
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<Memory>, rusqlite::Error> {
                conn.query_row(
                    &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE tenant_id = ?1 AND id = ?2"),
                    params![tenant, id],
                    row_to_memory,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    /// All memories of the tenant that have not expired at `now`.
    pub async fn list_active(
        &self,
        tenant: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Memory>, CortexError> {
        self.select_active(tenant, now, None).await
    }

    /// Non-expired memories whose importance is at least `threshold`.
    pub async fn list_critical(
        &self,
        tenant: &TenantId,
        threshold: f32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Memory>, CortexError> {
        self.select_active(tenant, now, Some(threshold)).await
    }

    async fn select_active(
        &self,
        tenant: &TenantId,
        now: DateTime<Utc>,
        min_importance: Option<f32>,
    ) -> Result<Vec<Memory>, CortexError> {
        let tenant = tenant.as_str().to_string();
        let now = timestamp(now);
        let min_importance = min_importance.unwrap_or(0.0);
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<Memory>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories
                     WHERE tenant_id = ?1
                       AND (expires_at IS NULL OR expires_at > ?2)
                       AND importance >= ?3
                     ORDER BY importance DESC, updated_at DESC"
                ))?;
                let memories = stmt
                    .query_map(params![tenant, now, min_importance], row_to_memory)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete one memory. Returns whether it existed for this tenant.
    pub async fn delete(&self, tenant: &TenantId, id: &str) -> Result<bool, CortexError> {
        let tenant = tenant.as_str().to_string();
        let id = id.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM memories WHERE tenant_id = ?1 AND id = ?2",
                    params![tenant, id],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(removed > 0)
    }

    /// Delete the tenant's memories, optionally only those recorded in one
    /// session. Returns the number removed.
    pub async fn clear(
        &self,
        tenant: &TenantId,
        session_id: Option<&str>,
    ) -> Result<usize, CortexError> {
        let tenant = tenant.as_str().to_string();
        let session_id = session_id.map(str::to_string);
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                match session_id {
                    Some(session_id) => conn.execute(
                        "DELETE FROM memories WHERE tenant_id = ?1 AND session_id = ?2",
                        params![tenant, session_id],
                    ),
                    None => conn.execute("DELETE FROM memories WHERE tenant_id = ?1", params![tenant]),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete memories that expired at or before `now`, across all tenants.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CortexError> {
        let now = timestamp(now);
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM memories WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn count(&self, tenant: &TenantId) -> Result<u64, CortexError> {
        let tenant = tenant.as_str().to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<u64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE tenant_id = ?1",
                    params![tenant],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }
}
