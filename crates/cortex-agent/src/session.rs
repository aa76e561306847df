// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory conversation sessions.
//!
//! Sessions are keyed by `(tenant, session_id)`, so an id issued to one
//! tenant never resolves to another tenant's history. History is bounded to
//! `max_history` messages and idle sessions are swept periodically.

use std::time::Duration;

use cortex_config::model::SessionConfig;
use cortex_core::{ChatMessage, TenantId};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Session {
    history: Vec<ChatMessage>,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            last_active: Instant::now(),
        }
    }
}

/// Owner of every live session of the engine.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<(TenantId, String), Session>,
    max_history: usize,
    idle_ttl: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history: config.max_history,
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
        }
    }

    /// Resolve a session, creating it when the id is absent or unknown for
    /// this tenant. Returns the session id and a copy of its history.
    pub fn get_or_create(
        &self,
        tenant: &TenantId,
        session_id: Option<&str>,
    ) -> (String, Vec<ChatMessage>) {
        let id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let mut session = self
            .sessions
            .entry((tenant.clone(), id.clone()))
            .or_insert_with(|| {
                debug!(tenant = %tenant, session_id = %id, "session created");
                Session::new()
            });
        session.last_active = Instant::now();
        let history = session.history.clone();
        (id, history)
    }

    /// Append a completed exchange, dropping the oldest messages beyond
    /// `max_history`.
    pub fn append(&self, tenant: &TenantId, session_id: &str, messages: Vec<ChatMessage>) {
        let mut session = self
            .sessions
            .entry((tenant.clone(), session_id.to_string()))
            .or_insert_with(Session::new);
        session.history.extend(messages);
        let overflow = session.history.len().saturating_sub(self.max_history);
        if overflow > 0 {
            session.history.drain(..overflow);
        }
        session.last_active = Instant::now();
    }

    pub fn history(&self, tenant: &TenantId, session_id: &str) -> Option<Vec<ChatMessage>> {
        self.sessions
            .get(&(tenant.clone(), session_id.to_string()))
            .map(|s| s.history.clone())
    }

    /// Drop sessions idle for longer than the configured TTL.
    pub fn sweep_idle(&self) -> usize {
        let before = self.sessions.len();
        let ttl = self.idle_ttl;
        self.sessions.retain(|_, s| s.last_active.elapsed() < ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "idle sessions swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_history: usize) -> SessionManager {
        SessionManager::new(&SessionConfig {
            max_history,
            idle_ttl_secs: 60,
        })
    }

    #[test]
    fn unknown_ids_create_sessions() {
        let sessions = manager(10);
        let tenant = TenantId::from("a");
        let (id, history) = sessions.get_or_create(&tenant, None);
        assert!(!id.is_empty());
        assert!(history.is_empty());

        let (same, _) = sessions.get_or_create(&tenant, Some(&id));
        assert_eq!(same, id);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let sessions = manager(4);
        let tenant = TenantId::from("a");
        let (id, _) = sessions.get_or_create(&tenant, None);
        for i in 0..3 {
            sessions.append(
                &tenant,
                &id,
                vec![
                    ChatMessage::user(format!("q{i}")),
                    ChatMessage::assistant(format!("a{i}")),
                ],
            );
        }
        let history = sessions.history(&tenant, &id).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "q1");
        assert_eq!(history[3].content, "a2");
    }

    #[test]
    fn sessions_are_tenant_scoped() {
        let sessions = manager(10);
        let a = TenantId::from("a");
        let b = TenantId::from("b");
        let (id, _) = sessions.get_or_create(&a, Some("shared"));
        sessions.append(&a, &id, vec![ChatMessage::user("secret")]);

        let (other, history) = sessions.get_or_create(&b, Some("shared"));
        assert_eq!(other, "shared");
        assert!(history.is_empty());
        assert_eq!(sessions.history(&a, "shared").unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_swept() {
        let sessions = manager(10);
        let tenant = TenantId::from("a");
        sessions.get_or_create(&tenant, Some("old"));
        tokio::time::advance(Duration::from_secs(45)).await;
        sessions.get_or_create(&tenant, Some("fresh"));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(sessions.sweep_idle(), 1);
        assert!(sessions.history(&tenant, "old").is_none());
        assert!(sessions.history(&tenant, "fresh").is_some());
    }
}
