// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering recalled memories into the system prompt.

use crate::types::ScoredMemory;

const CRITICAL_HEADER: &str = "[Critical information about the user:]";
const RELEVANT_HEADER: &str = "[Relevant context from previous conversations:]";

/// Format recalled memories as prompt sections: always-injected memories
/// first, then similarity hits. `None` when nothing was recalled.
pub fn format_memory_context(memories: &[ScoredMemory]) -> Option<String> {
    let section = |header: &str, critical: bool| {
        let lines: Vec<String> = memories
            .iter()
            .filter(|s| s.critical == critical)
            .map(|s| format!("- {}", s.memory.content))
            .collect();
        (!lines.is_empty()).then(|| format!("{header}\n{}", lines.join("\n")))
    };
    let sections: Vec<String> = [section(CRITICAL_HEADER, true), section(RELEVANT_HEADER, false)]
        .into_iter()
        .flatten()
        .collect();
    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

/// Place memory context ahead of the base prompt.
pub fn augment_system_prompt(base_prompt: &str, memory_context: Option<&str>) -> String {
    match memory_context {
        Some(context) if !context.is_empty() => format!("{context}\n\n{base_prompt}"),
        _ => base_prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use cortex_core::TenantId;

    use super::*;
    use crate::types::{Memory, MemoryType};

    fn scored(content: &str, critical: bool) -> ScoredMemory {
        let now = Utc::now();
        ScoredMemory {
            memory: Memory {
                id: content.into(),
                tenant_id: TenantId::from("t"),
                subject: "user".into(),
                predicate: "note".into(),
                object: content.into(),
                content: content.into(),
                object_type: "text".into(),
                memory_type: MemoryType::Fact,
                importance: if critical { 1.0 } else { 0.5 },
                confidence: 1.0,
                tags: vec![],
                embedding: vec![],
                embedding_model: None,
                source_turn_id: None,
                session_id: None,
                created_at: now,
                updated_at: now,
                expires_at: None,
            },
            similarity: 0.7,
            critical,
        }
    }

    #[test]
    fn critical_section_comes_first() {
        let context = format_memory_context(&[
            scored("User prefers dark mode", false),
            scored("User is allergic to shellfish", true),
        ])
        .unwrap();
        assert_eq!(
            context,
            "[Critical information about the user:]\n- User is allergic to shellfish\n\n\
             [Relevant context from previous conversations:]\n- User prefers dark mode"
        );
    }

    #[test]
    fn empty_recall_renders_nothing() {
        assert!(format_memory_context(&[]).is_none());
        assert_eq!(augment_system_prompt("base", None), "base");
    }

    #[test]
    fn context_precedes_base_prompt() {
        let context = format_memory_context(&[scored("User likes tea", false)]);
        let prompt = augment_system_prompt("You are helpful.", context.as_deref());
        assert!(prompt.starts_with(RELEVANT_HEADER));
        assert!(prompt.ends_with("\n\nYou are helpful."));
    }
}
