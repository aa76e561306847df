// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured memory extraction from conversation turns.
//!
//! Turns are claimed from the durable queue, grouped by session, sent to the
//! extraction model together with a bounded window of earlier context, and
//! the returned tuples are upserted. A group is settled only after its
//! memories are stored, so a crash re-extracts it (upsert makes that
//! harmless). All runs are serialized, which keeps each session FIFO.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cortex_config::model::{ExtractionConfig, MemoryConfig};
use cortex_config::ExtractionMode;
use cortex_core::types::{ProviderRequest, SamplingParams};
use cortex_core::{ChatMessage, CortexError, ProviderAdapter, TenantId};
use cortex_storage::queries::turns;
use cortex_storage::{Database, TurnRecord, TurnStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::store::MemoryStore;
use crate::types::{clamp_importance, MemoryType, NewMemory, UpsertOutcome, DEFAULT_IMPORTANCE};

/// Tags or object types that mark a fact as safety-critical.
const SAFETY_TAGS: &[&str] = &["allergy", "medical", "health", "safety"];
/// Floor for safety-critical importance.
const SAFETY_IMPORTANCE: f32 = 0.95;
/// Ceiling for ordinary preferences.
const PREFERENCE_CEILING: f32 = 0.7;
const SUMMARY_IMPORTANCE: f32 = 0.5;
/// Longest expiry accepted from the model (one century).
const MAX_EXPIRY_DAYS: f64 = 36_500.0;

const EXTRACTION_INSTRUCTION: &str = r#"You maintain long-term memory for an assistant. Read the conversation and extract atomic, reusable facts about the user from the latest exchange. Earlier lines are context for disambiguation only.

Rules:
- Extracting nothing is normal. Never invent facts; every fact must be stated or clearly confirmed by the user.
- Use narrow snake_case predicates (loves, hates, allergic_to, works_at, has_goal).
- Set "negation": true for negated facts instead of rewording the predicate.
- Importance is 0.0 to 1.0. Safety or health critical facts (allergies, medical conditions) score 1.0. Ordinary or transient preferences score at most 0.7. Most facts are 0.7 or lower.
- Confidence is 1.0 unless the statement is genuinely ambiguous.
- Use "expires_in_days" only for facts that are clearly temporary.

Respond with JSON only, no prose:
{
  "memories": [
    {
      "subject": "user",
      "predicate": "allergic_to",
      "object": "shellfish",
      "object_type": "allergy",
      "negation": false,
      "importance": 1.0,
      "confidence": 1.0,
      "natural_language": "User is allergic to shellfish",
      "tags": ["allergy", "food"],
      "expires_in_days": null
    }
  ],
  "summary_if_episode_end": null
}"#;

/// A validated, policy-adjusted memory tuple from the extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMemory {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub object_type: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub confidence: f32,
    pub content: String,
    pub tags: Vec<String>,
    pub expires_in_days: Option<f64>,
}

/// Parsed model output. `dropped` counts individual items that were
/// malformed and skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExtraction {
    pub memories: Vec<ExtractedMemory>,
    pub summary: Option<String>,
    pub dropped: usize,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default = "default_subject")]
    subject: String,
    predicate: String,
    object: Value,
    #[serde(default)]
    object_type: Option<String>,
    #[serde(default)]
    negation: bool,
    #[serde(default)]
    importance: Option<f32>,
    #[serde(default)]
    confidence: Option<f32>,
    natural_language: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    expires_in_days: Option<f64>,
}

fn default_subject() -> String {
    "user".to_string()
}

/// Parse the model's reply. Code fences and surrounding prose are
/// tolerated; a bare array is read as the memory list.
///
/// Fails with [`CortexError::ExtractionParse`] when no JSON document can be
/// read at all. Individual malformed items are only counted.
pub fn parse_extraction(raw: &str) -> Result<ParsedExtraction, CortexError> {
    let document = json_document(raw).ok_or_else(|| CortexError::ExtractionParse {
        message: "no JSON document in model output".to_string(),
    })?;
    let value: Value = serde_json::from_str(document).map_err(|e| CortexError::ExtractionParse {
        message: e.to_string(),
    })?;

    let (items, summary) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let items = match map.remove("memories") {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => {
                    return Err(CortexError::ExtractionParse {
                        message: "`memories` is not an array".to_string(),
                    });
                }
            };
            let summary = map
                .remove("summary_if_episode_end")
                .and_then(|v| v.as_str().map(str::trim).map(str::to_string))
                .filter(|s| !s.is_empty());
            (items, summary)
        }
        _ => {
            return Err(CortexError::ExtractionParse {
                message: "expected a JSON object or array".to_string(),
            });
        }
    };

    let mut parsed = ParsedExtraction {
        summary,
        ..ParsedExtraction::default()
    };
    for item in items {
        match serde_json::from_value::<RawItem>(item).ok().and_then(normalize_item) {
            Some(memory) => parsed.memories.push(memory),
            None => parsed.dropped += 1,
        }
    }
    Ok(parsed)
}

fn json_document(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let close = if raw[start..].starts_with('{') { '}' } else { ']' };
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

fn render_object(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_object)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn normalize_item(raw: RawItem) -> Option<ExtractedMemory> {
    let subject = raw.subject.trim().to_lowercase();
    let mut predicate = raw.predicate.trim().to_lowercase().replace([' ', '-'], "_");
    let object = render_object(&raw.object)?;
    let content = raw.natural_language.trim().to_string();
    if subject.is_empty() || predicate.is_empty() || content.is_empty() {
        return None;
    }
    if raw.negation && !predicate.starts_with("not_") {
        predicate = format!("not_{predicate}");
    }
    let object_type = raw
        .object_type
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "text".to_string());
    let tags: Vec<String> = raw
        .tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    let memory_type = if object_type == "preference" {
        MemoryType::Preference
    } else {
        MemoryType::Fact
    };
    let importance = banded_importance(
        raw.importance.unwrap_or(DEFAULT_IMPORTANCE),
        &object_type,
        &tags,
    );
    Some(ExtractedMemory {
        subject,
        predicate,
        object,
        object_type,
        memory_type,
        importance,
        confidence: raw.confidence.map_or(1.0, clamp_importance),
        content,
        tags,
        expires_in_days: raw
            .expires_in_days
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.min(MAX_EXPIRY_DAYS)),
    })
}

/// Apply the importance policy: safety-critical facts are raised to at
/// least 0.95, plain preferences are capped at 0.7, and everything ends up
/// in `[0, 1]`.
pub fn banded_importance(raw: f32, object_type: &str, tags: &[String]) -> f32 {
    let importance = clamp_importance(raw);
    let safety = SAFETY_TAGS
        .iter()
        .any(|s| object_type == *s || tags.iter().any(|t| t == s));
    if safety {
        importance.max(SAFETY_IMPORTANCE)
    } else if object_type == "preference" {
        importance.min(PREFERENCE_CEILING)
    } else {
        importance
    }
}

/// Result of one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Turns claimed.
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Turns returned to the queue for another attempt.
    pub released: usize,
    pub memories_created: usize,
    pub memories_updated: usize,
    /// Unparseable replies plus individually malformed items.
    pub parse_errors: usize,
}

/// Queue state and settings, for administrative status queries.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionStatus {
    pub pending_count: u64,
    pub processing_count: u64,
    pub failed_count: u64,
    pub extraction_enabled: bool,
    pub mode: ExtractionMode,
    pub batch_size: usize,
}

enum GroupOutcome {
    Completed { created: usize, updated: usize, dropped: usize },
    Skipped { dropped: usize },
    Unparseable(String),
}

pub struct ExtractionPipeline {
    db: Database,
    store: MemoryStore,
    cache: Arc<EmbeddingCache>,
    provider: Arc<dyn ProviderAdapter>,
    config: ExtractionConfig,
    embedding_model: String,
    active: bool,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("provider", &self.provider.name())
            .field("mode", &self.config.mode)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl ExtractionPipeline {
    pub fn new(
        db: Database,
        cache: Arc<EmbeddingCache>,
        provider: Arc<dyn ProviderAdapter>,
        config: ExtractionConfig,
        memory: &MemoryConfig,
    ) -> Self {
        let active = config.enabled && memory.enabled && cache.is_available();
        Self {
            store: MemoryStore::new(db.clone()),
            db,
            cache,
            provider,
            config,
            embedding_model: memory.embedding_model.clone(),
            active,
            run_lock: Mutex::new(()),
        }
    }

    /// Extraction runs only when enabled and memory can be embedded.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> ExtractionMode {
        self.config.mode
    }

    /// Process up to `limit` pending turns (never more than `batch_size`).
    pub async fn run_batch(&self, limit: Option<usize>) -> Result<ExtractionReport, CortexError> {
        if !self.active {
            return Ok(ExtractionReport::default());
        }
        let limit = limit.map_or(self.config.batch_size, |l| l.min(self.config.batch_size));
        let _run = self.run_lock.lock().await;

        let claimed = turns::claim_batch(&self.db, limit).await?;
        let mut report = ExtractionReport {
            total: claimed.len(),
            ..ExtractionReport::default()
        };
        for (tenant, session_id, group) in group_by_session(claimed) {
            if let Err(e) = self.settle_group(&tenant, &session_id, &group, &mut report).await {
                self.release_unsettled(&tenant, &session_id, &group, &e, &mut report)
                    .await;
            }
        }
        if report.total > 0 {
            info!(
                total = report.total,
                completed = report.completed,
                skipped = report.skipped,
                failed = report.failed,
                released = report.released,
                created = report.memories_created,
                updated = report.memories_updated,
                parse_errors = report.parse_errors,
                "extraction batch finished"
            );
        }
        Ok(report)
    }

    /// Extract every pending turn of one session, used after each
    /// assistant reply in inline mode.
    pub async fn run_session(
        &self,
        tenant: &TenantId,
        session_id: &str,
    ) -> Result<ExtractionReport, CortexError> {
        if !self.active {
            return Ok(ExtractionReport::default());
        }
        let _run = self.run_lock.lock().await;
        let claimed = turns::claim_session(&self.db, tenant, session_id).await?;
        let mut report = ExtractionReport {
            total: claimed.len(),
            ..ExtractionReport::default()
        };
        if !claimed.is_empty()
            && let Err(e) = self.settle_group(tenant, session_id, &claimed, &mut report).await
        {
            self.release_unsettled(tenant, session_id, &claimed, &e, &mut report)
                .await;
            return Err(e);
        }
        Ok(report)
    }

    pub async fn status(&self) -> Result<ExtractionStatus, CortexError> {
        let counts = turns::counts(&self.db).await?;
        Ok(ExtractionStatus {
            pending_count: counts.pending,
            processing_count: counts.processing,
            failed_count: counts.failed,
            extraction_enabled: self.active,
            mode: self.config.mode,
            batch_size: self.config.batch_size,
        })
    }

    /// Return claims abandoned by a previous process to the queue.
    pub async fn recover_stale(&self, older_than_secs: u64) -> Result<usize, CortexError> {
        let released = turns::release_stale(&self.db, older_than_secs).await?;
        if released > 0 {
            warn!(released, "released stale extraction claims");
        }
        Ok(released)
    }

    /// Hand a group back to the queue after its outcome could not be
    /// recorded. If that also fails the turns stay claimed until
    /// [`recover_stale`](Self::recover_stale) picks them up.
    async fn release_unsettled(
        &self,
        tenant: &TenantId,
        session_id: &str,
        group: &[TurnRecord],
        cause: &CortexError,
        report: &mut ExtractionReport,
    ) {
        warn!(tenant = %tenant, session_id, error = %cause, "could not settle extraction group, releasing turns");
        let ids: Vec<i64> = group.iter().map(|t| t.id).collect();
        match turns::release(&self.db, &ids, self.config.max_attempts, &cause.to_string()).await {
            Ok(failed) => {
                report.failed += failed;
                report.released += ids.len() - failed;
            }
            Err(e) => {
                warn!(tenant = %tenant, session_id, error = %e, "release failed, turns left for stale recovery");
            }
        }
    }

    async fn settle_group(
        &self,
        tenant: &TenantId,
        session_id: &str,
        group: &[TurnRecord],
        report: &mut ExtractionReport,
    ) -> Result<(), CortexError> {
        let ids: Vec<i64> = group.iter().map(|t| t.id).collect();
        match self.process_group(tenant, session_id, group).await {
            Ok(GroupOutcome::Completed {
                created,
                updated,
                dropped,
            }) => {
                turns::settle(&self.db, &ids, TurnStatus::Completed, None).await?;
                report.completed += ids.len();
                report.memories_created += created;
                report.memories_updated += updated;
                report.parse_errors += dropped;
                metrics::counter!("cortex_extraction_turns_total", "outcome" => "completed")
                    .increment(ids.len() as u64);
            }
            Ok(GroupOutcome::Skipped { dropped }) => {
                turns::settle(&self.db, &ids, TurnStatus::Skipped, None).await?;
                report.skipped += ids.len();
                report.parse_errors += dropped;
                metrics::counter!("cortex_extraction_turns_total", "outcome" => "skipped")
                    .increment(ids.len() as u64);
            }
            Ok(GroupOutcome::Unparseable(message)) => {
                warn!(tenant = %tenant, session_id, turns = ids.len(), error = %message, "dropping unparseable extraction output");
                turns::settle(&self.db, &ids, TurnStatus::Failed, Some(&message)).await?;
                report.failed += ids.len();
                report.parse_errors += 1;
                metrics::counter!("cortex_extraction_turns_total", "outcome" => "failed")
                    .increment(ids.len() as u64);
            }
            Err(e) => {
                warn!(tenant = %tenant, session_id, error = %e, "extraction attempt failed, releasing turns");
                let failed =
                    turns::release(&self.db, &ids, self.config.max_attempts, &e.to_string())
                        .await?;
                report.failed += failed;
                report.released += ids.len() - failed;
                metrics::counter!("cortex_extraction_turns_total", "outcome" => "released")
                    .increment(ids.len() as u64);
            }
        }
        Ok(())
    }

    async fn process_group(
        &self,
        tenant: &TenantId,
        session_id: &str,
        group: &[TurnRecord],
    ) -> Result<GroupOutcome, CortexError> {
        let worth_extracting = group.iter().any(|t| {
            t.role == "user" && t.content.trim().chars().count() >= self.config.min_content_chars
        });
        let Some(first) = group.first() else {
            return Ok(GroupOutcome::Skipped { dropped: 0 });
        };
        if !worth_extracting {
            debug!(session_id, "no extractable user content");
            return Ok(GroupOutcome::Skipped { dropped: 0 });
        }

        let context = turns::context_before(
            &self.db,
            tenant,
            session_id,
            first.id,
            self.config.context_window,
        )
        .await?;
        let response = self
            .provider
            .generate(ProviderRequest {
                model: self.config.model.clone(),
                system_prompt: Some(EXTRACTION_INSTRUCTION.to_string()),
                messages: vec![ChatMessage::user(transcript(&context, group))],
                params: SamplingParams {
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                    ..SamplingParams::default()
                },
            })
            .await?;

        let parsed = match parse_extraction(&response.content) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(GroupOutcome::Unparseable(e.to_string())),
        };
        if parsed.dropped > 0 {
            warn!(session_id, dropped = parsed.dropped, "dropped malformed extraction items");
        }
        if parsed.memories.is_empty() && parsed.summary.is_none() {
            return Ok(GroupOutcome::Skipped {
                dropped: parsed.dropped,
            });
        }

        let source_turn_id = group.last().map(|t| t.id);
        let now = Utc::now();
        let (mut created, mut updated) = (0, 0);
        let mut pending: Vec<NewMemory> = parsed
            .memories
            .into_iter()
            .map(|m| self.to_new_memory(tenant, session_id, source_turn_id, m, now))
            .collect();
        if let Some(summary) = parsed.summary {
            let mut memory = NewMemory::fact(
                tenant.clone(),
                "conversation",
                "summary",
                session_id,
                summary,
                SUMMARY_IMPORTANCE,
            );
            memory.object_type = "summary".to_string();
            memory.memory_type = MemoryType::Summary;
            memory.session_id = Some(session_id.to_string());
            memory.source_turn_id = source_turn_id;
            pending.push(memory);
        }

        for mut memory in pending {
            let vector = self
                .cache
                .get_or_compute(&memory.content, &self.embedding_model)
                .await?;
            memory.embedding = vector.to_vec();
            memory.embedding_model = Some(self.embedding_model.clone());
            match self.store.upsert(memory).await?.1 {
                UpsertOutcome::Created => created += 1,
                UpsertOutcome::Updated => updated += 1,
            }
        }
        metrics::counter!("cortex_memories_extracted_total").increment((created + updated) as u64);
        Ok(GroupOutcome::Completed {
            created,
            updated,
            dropped: parsed.dropped,
        })
    }

    fn to_new_memory(
        &self,
        tenant: &TenantId,
        session_id: &str,
        source_turn_id: Option<i64>,
        m: ExtractedMemory,
        now: DateTime<Utc>,
    ) -> NewMemory {
        NewMemory {
            tenant_id: tenant.clone(),
            subject: m.subject,
            predicate: m.predicate,
            object: m.object,
            content: m.content,
            object_type: m.object_type,
            memory_type: m.memory_type,
            importance: m.importance,
            confidence: m.confidence,
            tags: m.tags,
            embedding: Vec::new(),
            embedding_model: None,
            source_turn_id,
            session_id: Some(session_id.to_string()),
            expires_at: m.expires_in_days.and_then(|days| {
                Duration::try_seconds((days * 86_400.0) as i64)
                    .and_then(|ttl| now.checked_add_signed(ttl))
            }),
        }
    }
}

/// Group claimed turns by `(tenant, session)`, keeping queue order both
/// across and within groups.
fn group_by_session(claimed: Vec<TurnRecord>) -> Vec<(TenantId, String, Vec<TurnRecord>)> {
    let mut groups: Vec<(TenantId, String, Vec<TurnRecord>)> = Vec::new();
    for turn in claimed {
        let tenant = TenantId::new(turn.tenant_id.clone());
        match groups
            .iter_mut()
            .find(|(t, s, _)| *t == tenant && *s == turn.session_id)
        {
            Some((_, _, group)) => group.push(turn),
            None => groups.push((tenant, turn.session_id.clone(), vec![turn])),
        }
    }
    groups
}

fn transcript(context: &[TurnRecord], group: &[TurnRecord]) -> String {
    fn line(turn: &TurnRecord) -> String {
        let speaker = if turn.role == "user" { "User" } else { "Assistant" };
        format!("{speaker}: {}", turn.content)
    }
    let mut text = String::new();
    if !context.is_empty() {
        text.push_str("Earlier conversation:\n");
        for turn in context {
            text.push_str(&line(turn));
            text.push('\n');
        }
        text.push('\n');
    }
    text.push_str("Latest exchange:\n");
    for turn in group {
        text.push_str(&line(turn));
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absurd_expiry_is_capped() {
        let raw = r#"[
            {"predicate": "visiting", "object": "Lisbon", "natural_language": "User is in Lisbon",
             "expires_in_days": 1e300},
            {"predicate": "staying_at", "object": "hotel", "natural_language": "User stays at a hotel",
             "expires_in_days": 1000000000},
            {"predicate": "has", "object": "cold", "natural_language": "User has a cold",
             "expires_in_days": 3}
        ]"#;
        let parsed = parse_extraction(raw).unwrap();
        let days: Vec<_> = parsed.memories.iter().map(|m| m.expires_in_days).collect();
        assert_eq!(days, vec![Some(MAX_EXPIRY_DAYS), Some(MAX_EXPIRY_DAYS), Some(3.0)]);
    }

    #[test]
    fn parses_fenced_object_with_summary() {
        let raw = "```json\n{\"memories\": [{\"predicate\": \"loves\", \"object\": \"tea\", \
                   \"object_type\": \"food\", \"importance\": 0.6, \
                   \"natural_language\": \"User loves tea\"}], \
                   \"summary_if_episode_end\": \"Talked about drinks\"}\n```";
        let parsed = parse_extraction(raw).unwrap();
        assert_eq!(parsed.memories.len(), 1);
        let memory = &parsed.memories[0];
        assert_eq!(memory.subject, "user");
        assert_eq!(memory.predicate, "loves");
        assert_eq!(memory.object, "tea");
        assert_eq!(parsed.summary.as_deref(), Some("Talked about drinks"));
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn bare_array_is_accepted() {
        let raw = r#"[{"subject":"user","predicate":"hates","object":"olives","natural_language":"User hates olives"}]"#;
        let parsed = parse_extraction(raw).unwrap();
        assert_eq!(parsed.memories[0].object, "olives");
        assert_eq!(parsed.memories[0].importance, DEFAULT_IMPORTANCE);
    }

    #[test]
    fn malformed_items_are_counted_not_fatal() {
        let raw = r#"{"memories": [
            {"predicate": "likes", "object": "jazz", "natural_language": "User likes jazz"},
            {"predicate": "likes"},
            {"predicate": "owns", "object": null, "natural_language": "?"},
            "nonsense"
        ]}"#;
        let parsed = parse_extraction(raw).unwrap();
        assert_eq!(parsed.memories.len(), 1);
        assert_eq!(parsed.dropped, 3);
    }

    #[test]
    fn unparseable_output_is_an_extraction_error() {
        for raw in ["I could not find anything.", "{\"memories\": ", "{\"memories\": 3}", "42"] {
            assert!(
                matches!(parse_extraction(raw), Err(CortexError::ExtractionParse { .. })),
                "{raw}"
            );
        }
    }

    #[test]
    fn negation_prefixes_predicate_once() {
        let raw = r#"{"memories": [
            {"predicate": "likes", "object": "cilantro", "negation": true, "natural_language": "User does not like cilantro"},
            {"predicate": "not_eats", "object": "pork", "negation": true, "natural_language": "User does not eat pork"}
        ]}"#;
        let parsed = parse_extraction(raw).unwrap();
        assert_eq!(parsed.memories[0].predicate, "not_likes");
        assert_eq!(parsed.memories[1].predicate, "not_eats");
    }

    #[test]
    fn list_and_scalar_objects_are_rendered() {
        let raw = r#"{"memories": [
            {"predicate": "speaks", "object": ["English", "Hindi"], "natural_language": "User speaks English and Hindi"},
            {"predicate": "age", "object": 34, "natural_language": "User is 34"}
        ]}"#;
        let parsed = parse_extraction(raw).unwrap();
        assert_eq!(parsed.memories[0].object, "English, Hindi");
        assert_eq!(parsed.memories[1].object, "34");
    }

    #[test]
    fn importance_banding() {
        let none: Vec<String> = vec![];
        assert_eq!(banded_importance(0.3, "allergy", &none), SAFETY_IMPORTANCE);
        assert_eq!(banded_importance(1.0, "food", &["medical".to_string()]), 1.0);
        assert_eq!(banded_importance(0.9, "preference", &none), PREFERENCE_CEILING);
        assert_eq!(banded_importance(0.4, "preference", &none), 0.4);
        assert_eq!(banded_importance(1.5, "topic", &none), 1.0);
        assert_eq!(banded_importance(f32::INFINITY, "topic", &none), DEFAULT_IMPORTANCE);
    }

    #[test]
    fn groups_keep_queue_order() {
        let turn = |id: i64, tenant: &str, session: &str| TurnRecord {
            id,
            tenant_id: tenant.into(),
            session_id: session.into(),
            role: "user".into(),
            content: "x".into(),
            status: TurnStatus::Processing,
            attempts: 0,
            error: None,
            created_at: String::new(),
        };
        let groups = group_by_session(vec![
            turn(1, "a", "s1"),
            turn(2, "b", "s1"),
            turn(3, "a", "s2"),
            turn(4, "a", "s1"),
        ]);
        let shape: Vec<(String, String, Vec<i64>)> = groups
            .into_iter()
            .map(|(t, s, g)| (t.to_string(), s, g.iter().map(|t| t.id).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("a".into(), "s1".into(), vec![1, 4]),
                ("b".into(), "s1".into(), vec![2]),
                ("a".into(), "s2".into(), vec![3]),
            ]
        );
    }
}
