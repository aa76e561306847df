// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe queue of conversation turns awaiting memory extraction.
//!
//! Turns are claimed by flipping them to `processing` inside a transaction.
//! A claim that is never settled (crash, cancelled run) is returned to
//! `pending` by [`release_stale`], which gives at-least-once processing.

use std::str::FromStr;

use cortex_core::{ChatRole, CortexError, TenantId};
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::{TurnCounts, TurnRecord, TurnStatus};

const TURN_COLUMNS: &str =
    "id, tenant_id, session_id, role, content, status, attempts, error, created_at";

fn row_to_turn(row: &Row<'_>) -> Result<TurnRecord, rusqlite::Error> {
    let status: String = row.get(5)?;
    let status = TurnStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TurnRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        session_id: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        status,
        attempts: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Append a turn to the queue. Returns its id, which also fixes its position.
pub async fn enqueue(
    db: &Database,
    tenant: &TenantId,
    session_id: &str,
    role: ChatRole,
    content: &str,
) -> Result<i64, CortexError> {
    if role == ChatRole::System {
        return Err(CortexError::Validation(
            "system messages are not conversation turns".to_string(),
        ));
    }
    let tenant = tenant.as_str().to_string();
    let session_id = session_id.to_string();
    let role = role.as_ref().to_string();
    let content = content.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO conversation_turns (tenant_id, session_id, role, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![tenant, session_id, role, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` of the oldest pending turns across all tenants.
///
/// Returned turns are in queue order, so turns of one session keep their
/// relative order.
pub async fn claim_batch(db: &Database, limit: usize) -> Result<Vec<TurnRecord>, CortexError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<TurnRecord>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let turns = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {TURN_COLUMNS} FROM conversation_turns
                     WHERE status = 'pending' ORDER BY id ASC LIMIT ?1"
                ))?;
                stmt.query_map(params![limit], row_to_turn)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            mark_processing(&tx, &turns)?;
            tx.commit()?;
            Ok(claimed(turns))
        })
        .await
        .map_err(map_tr_err)
}

/// Claim every pending turn of one session (inline extraction).
pub async fn claim_session(
    db: &Database,
    tenant: &TenantId,
    session_id: &str,
) -> Result<Vec<TurnRecord>, CortexError> {
    let tenant = tenant.as_str().to_string();
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<TurnRecord>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let turns = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {TURN_COLUMNS} FROM conversation_turns
                     WHERE status = 'pending' AND tenant_id = ?1 AND session_id = ?2
                     ORDER BY id ASC"
                ))?;
                stmt.query_map(params![tenant, session_id], row_to_turn)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            mark_processing(&tx, &turns)?;
            tx.commit()?;
            Ok(claimed(turns))
        })
        .await
        .map_err(map_tr_err)
}

fn mark_processing(tx: &rusqlite::Transaction<'_>, turns: &[TurnRecord]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "UPDATE conversation_turns SET status = 'processing',
         claimed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
    )?;
    for turn in turns {
        stmt.execute(params![turn.id])?;
    }
    Ok(())
}

fn claimed(turns: Vec<TurnRecord>) -> Vec<TurnRecord> {
    turns
        .into_iter()
        .map(|t| TurnRecord {
            status: TurnStatus::Processing,
            ..t
        })
        .collect()
}

/// Up to `limit` turns of the session preceding `before_id`, oldest first,
/// regardless of status. Used as conversational context for extraction.
pub async fn context_before(
    db: &Database,
    tenant: &TenantId,
    session_id: &str,
    before_id: i64,
    limit: usize,
) -> Result<Vec<TurnRecord>, CortexError> {
    let tenant = tenant.as_str().to_string();
    let session_id = session_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<TurnRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TURN_COLUMNS} FROM conversation_turns
                 WHERE tenant_id = ?1 AND session_id = ?2 AND id < ?3
                 ORDER BY id DESC LIMIT ?4"
            ))?;
            let mut turns = stmt
                .query_map(params![tenant, session_id, before_id, limit], row_to_turn)?
                .collect::<Result<Vec<_>, _>>()?;
            turns.reverse();
            Ok(turns)
        })
        .await
        .map_err(map_tr_err)
}

/// Settle claimed turns with a terminal status.
pub async fn settle(
    db: &Database,
    ids: &[i64],
    status: TurnStatus,
    error: Option<&str>,
) -> Result<(), CortexError> {
    if !matches!(
        status,
        TurnStatus::Completed | TurnStatus::Skipped | TurnStatus::Failed
    ) {
        return Err(CortexError::Internal(format!(
            "cannot settle turns as {status}"
        )));
    }
    let ids = ids.to_vec();
    let status = status.as_ref().to_string();
    let error = error.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "UPDATE conversation_turns SET status = ?1, error = ?2,
                     extracted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                )?;
                for id in &ids {
                    stmt.execute(params![status, error, id])?;
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Return claimed turns to the queue after a transient failure.
///
/// Each release counts as an attempt; turns reaching `max_attempts` are
/// failed with `error` instead. Returns how many turns were failed.
pub async fn release(
    db: &Database,
    ids: &[i64],
    max_attempts: u32,
    error: &str,
) -> Result<usize, CortexError> {
    let ids = ids.to_vec();
    let error = error.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut failed = 0;
            for id in &ids {
                let attempts: u32 = tx.query_row(
                    "SELECT attempts FROM conversation_turns WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                let attempts = attempts + 1;
                let status = if attempts >= max_attempts {
                    failed += 1;
                    "failed"
                } else {
                    "pending"
                };
                tx.execute(
                    "UPDATE conversation_turns
                     SET status = ?1, attempts = ?2, error = ?3, claimed_at = NULL
                     WHERE id = ?4",
                    params![status, attempts, error, id],
                )?;
            }
            tx.commit()?;
            Ok(failed)
        })
        .await
        .map_err(map_tr_err)
}

/// Return turns stuck in `processing` for longer than `older_than_secs` to
/// `pending`. Returns the number of turns recovered.
pub async fn release_stale(db: &Database, older_than_secs: u64) -> Result<usize, CortexError> {
    let modifier = format!("-{older_than_secs} seconds");
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE conversation_turns SET status = 'pending', claimed_at = NULL
                 WHERE status = 'processing'
                   AND claimed_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)",
                params![modifier],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Queue depth by status.
pub async fn counts(db: &Database) -> Result<TurnCounts, CortexError> {
    db.connection()
        .call(|conn| -> Result<TurnCounts, rusqlite::Error> {
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM conversation_turns GROUP BY status")?;
            let mut counts = TurnCounts::default();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?;
            for row in rows {
                let (status, n) = row?;
                match TurnStatus::from_str(&status) {
                    Ok(TurnStatus::Pending) => counts.pending = n,
                    Ok(TurnStatus::Processing) => counts.processing = n,
                    Ok(TurnStatus::Completed) => counts.completed = n,
                    Ok(TurnStatus::Skipped) => counts.skipped = n,
                    Ok(TurnStatus::Failed) => counts.failed = n,
                    Err(_) => {}
                }
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn tenant() -> TenantId {
        TenantId::new("acme")
    }

    async fn status_of(db: &Database, id: i64) -> (String, u32) {
        db.connection()
            .call(move |conn| -> Result<(String, u32), rusqlite::Error> {
                conn.query_row(
                    "SELECT status, attempts FROM conversation_turns WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claim_batch_is_fifo_and_exclusive() {
        let db = setup_db().await;
        let a = enqueue(&db, &tenant(), "s1", ChatRole::User, "first").await.unwrap();
        let b = enqueue(&db, &tenant(), "s1", ChatRole::Assistant, "second").await.unwrap();
        let c = enqueue(&db, &tenant(), "s2", ChatRole::User, "third").await.unwrap();

        let batch = claim_batch(&db, 2).await.unwrap();
        assert_eq!(batch.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(batch.iter().all(|t| t.status == TurnStatus::Processing));

        let rest = claim_batch(&db, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, c);
        assert!(claim_batch(&db, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn system_role_is_rejected() {
        let db = setup_db().await;
        let err = enqueue(&db, &tenant(), "s1", ChatRole::System, "x").await.unwrap_err();
        assert!(matches!(err, CortexError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_session_only_takes_that_session() {
        let db = setup_db().await;
        enqueue(&db, &tenant(), "s1", ChatRole::User, "one").await.unwrap();
        enqueue(&db, &tenant(), "s2", ChatRole::User, "two").await.unwrap();
        enqueue(&db, &TenantId::new("other"), "s1", ChatRole::User, "three")
            .await
            .unwrap();

        let claimed = claim_session(&db, &tenant(), "s1").await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].content, "one");
        assert_eq!(counts(&db).await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn settle_marks_terminal_status() {
        let db = setup_db().await;
        let id = enqueue(&db, &tenant(), "s1", ChatRole::User, "hello there").await.unwrap();
        claim_batch(&db, 1).await.unwrap();

        settle(&db, &[id], TurnStatus::Skipped, None).await.unwrap();
        assert_eq!(status_of(&db, id).await.0, "skipped");

        let err = settle(&db, &[id], TurnStatus::Pending, None).await.unwrap_err();
        assert!(matches!(err, CortexError::Internal(_)));
    }

    #[tokio::test]
    async fn release_retries_then_fails_at_max_attempts() {
        let db = setup_db().await;
        let id = enqueue(&db, &tenant(), "s1", ChatRole::User, "hello").await.unwrap();

        for expected in 1..=2 {
            claim_batch(&db, 1).await.unwrap();
            let failed = release(&db, &[id], 3, "provider down").await.unwrap();
            assert_eq!(failed, 0);
            assert_eq!(status_of(&db, id).await, ("pending".to_string(), expected));
        }

        claim_batch(&db, 1).await.unwrap();
        assert_eq!(release(&db, &[id], 3, "provider down").await.unwrap(), 1);
        assert_eq!(status_of(&db, id).await, ("failed".to_string(), 3));
    }

    #[tokio::test]
    async fn stale_claims_are_recovered() {
        let db = setup_db().await;
        let id = enqueue(&db, &tenant(), "s1", ChatRole::User, "hello").await.unwrap();
        claim_batch(&db, 1).await.unwrap();

        // A fresh claim is not stale yet.
        assert_eq!(release_stale(&db, 3600).await.unwrap(), 0);
        assert_eq!(release_stale(&db, 0).await.unwrap(), 1);
        assert_eq!(status_of(&db, id).await.0, "pending");
    }

    #[tokio::test]
    async fn context_before_returns_preceding_turns_in_order() {
        let db = setup_db().await;
        for text in ["a", "b", "c", "d"] {
            enqueue(&db, &tenant(), "s1", ChatRole::User, text).await.unwrap();
        }
        let last = enqueue(&db, &tenant(), "s1", ChatRole::User, "e").await.unwrap();

        let context = context_before(&db, &tenant(), "s1", last, 2).await.unwrap();
        let texts: Vec<_> = context.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(texts, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn counts_group_by_status() {
        let db = setup_db().await;
        let a = enqueue(&db, &tenant(), "s1", ChatRole::User, "a").await.unwrap();
        enqueue(&db, &tenant(), "s1", ChatRole::User, "b").await.unwrap();
        claim_batch(&db, 1).await.unwrap();
        settle(&db, &[a], TurnStatus::Completed, None).await.unwrap();

        let counts = counts(&db).await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 0);
    }
}
