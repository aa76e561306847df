// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types and vector helpers.

use chrono::{DateTime, Utc};
use cortex_core::TenantId;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Importance given to scores the model did not express as a finite number.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Summary,
}

/// A durable fact about a user, stored per tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub tenant_id: TenantId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Natural-language rendering injected into prompts.
    pub content: String,
    pub object_type: String,
    pub memory_type: MemoryType,
    /// Always within `[0, 1]`.
    pub importance: f32,
    pub confidence: f32,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub embedding_model: Option<String>,
    pub source_turn_id: Option<i64>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Memory {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Input to [`crate::MemoryStore::upsert`]. Identity is
/// `(tenant, subject, predicate, object)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub tenant_id: TenantId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub content: String,
    pub object_type: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub confidence: f32,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
    pub embedding_model: Option<String>,
    pub source_turn_id: Option<i64>,
    pub session_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewMemory {
    /// A plain fact with neutral metadata; callers fill in the rest.
    pub fn fact(
        tenant_id: TenantId,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        content: impl Into<String>,
        importance: f32,
    ) -> Self {
        Self {
            tenant_id,
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            content: content.into(),
            object_type: "text".to_string(),
            memory_type: MemoryType::Fact,
            importance,
            confidence: 1.0,
            tags: Vec::new(),
            embedding: Vec::new(),
            embedding_model: None,
            source_turn_id: None,
            session_id: None,
            expires_at: None,
        }
    }
}

/// Whether an upsert inserted a row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// A recalled memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Cosine similarity to the query; 0 when the memory has no comparable
    /// vector.
    pub similarity: f32,
    /// Included because its importance reached the always-inject threshold.
    pub critical: bool,
}

/// Clamp a model-supplied importance into `[0, 1]`.
pub fn clamp_importance(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_IMPORTANCE
    }
}

/// Encode a vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity. Mismatched lengths or a zero vector yield 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
