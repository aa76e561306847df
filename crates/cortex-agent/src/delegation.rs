// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leader delegation protocol.
//!
//! The leader sees a manifest of specialists and delegates by answering with
//! `{"delegate": [{"agent": "<name>", "task": "<task>"}]}`. Any other answer
//! is its final reply. Specialist outputs are returned to the leader as
//! attributed blocks for synthesis.

use serde::Deserialize;

use crate::registry::Agent;

/// One task the leader handed to a specialist.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DelegationTask {
    pub agent: String,
    pub task: String,
}

#[derive(Deserialize)]
struct DelegationEnvelope {
    delegate: Vec<DelegationTask>,
}

/// Interpret a leader reply as a delegation request.
///
/// Returns `None` for anything that is not a well-formed, non-empty request,
/// which makes the reply final.
pub fn parse_delegation(output: &str) -> Option<Vec<DelegationTask>> {
    let trimmed = output.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    if !body.starts_with('{') {
        return None;
    }
    let envelope: DelegationEnvelope = serde_json::from_str(body).ok()?;
    let tasks: Vec<DelegationTask> = envelope
        .delegate
        .into_iter()
        .filter(|t| !t.agent.trim().is_empty() && !t.task.trim().is_empty())
        .collect();
    (!tasks.is_empty()).then_some(tasks)
}

fn preview(prompt: &str, max_chars: usize) -> String {
    if prompt.trim().is_empty() {
        return "General purpose".to_string();
    }
    if prompt.chars().count() > max_chars {
        let cut: String = prompt.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        prompt.to_string()
    }
}

/// System prompt for the leader: its own prompt, the specialist manifest and
/// the delegation instruction.
pub fn leader_system_prompt(leader: &Agent, specialists: &[Agent], max_chars: usize) -> String {
    let mut prompt = leader.system_prompt.trim().to_string();
    if specialists.is_empty() {
        return prompt;
    }
    let manifest = specialists
        .iter()
        .map(|a| format!("- {} ({}): {}", a.name, a.role, preview(&a.system_prompt, max_chars)))
        .collect::<Vec<_>>()
        .join("\n");
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str("Available specialist agents:\n");
    prompt.push_str(&manifest);
    prompt.push_str(
        "\n\nTo delegate, reply with only a JSON object of the form \
         {\"delegate\": [{\"agent\": \"<name>\", \"task\": \"<task>\"}]}. \
         Otherwise answer the user directly.",
    );
    prompt
}

/// Outcome of one delegated task, as fed back to the leader.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialistReport {
    pub name: String,
    pub role: String,
    pub result: Result<String, String>,
}

/// Render specialist results as the leader's next input.
pub fn format_specialist_results(reports: &[SpecialistReport]) -> String {
    let blocks = reports
        .iter()
        .map(|r| match &r.result {
            Ok(output) => format!("[{} ({})]:\n{}", r.name, r.role, output),
            Err(error) => format!("[{} ({})] failed: {}", r.name, r.role, error),
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Specialist results:\n\n{blocks}\n\nUse these results to answer the original request.")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use cortex_core::TenantId;
    use cortex_core::types::{AgentRole, ProviderKind};

    use super::*;

    fn agent(name: &str, role: AgentRole, prompt: &str) -> Agent {
        Agent {
            id: name.to_string(),
            tenant_id: TenantId::from("t"),
            name: name.to_string(),
            role,
            provider: ProviderKind::Ollama,
            model: "m".to_string(),
            system_prompt: prompt.to_string(),
            base_url: None,
            max_tokens: 100,
            temperature: 0.5,
            enabled: true,
            has_credential: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn parses_delegation_object() {
        let tasks = parse_delegation(
            r#"{"delegate": [{"agent": "coder", "task": "write the function"}]}"#,
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].agent, "coder");
    }

    #[test]
    fn parses_fenced_delegation() {
        let raw = "```json\n{\"delegate\": [{\"agent\": \"r\", \"task\": \"look it up\"}]}\n```";
        assert!(parse_delegation(raw).is_some());
    }

    #[test]
    fn plain_answers_are_final() {
        assert!(parse_delegation("Here is your answer.").is_none());
        assert!(parse_delegation(r#"{"delegate": []}"#).is_none());
        assert!(parse_delegation(r#"{"answer": "x"}"#).is_none());
        assert!(parse_delegation(r#"{"delegate": [{"agent": "", "task": "x"}]}"#).is_none());
    }

    #[test]
    fn manifest_truncates_long_prompts() {
        let leader = agent("lead", AgentRole::Leader, "You coordinate.");
        let long = "x".repeat(150);
        let specialists = vec![
            agent("coder", AgentRole::Coder, &long),
            agent("researcher", AgentRole::Researcher, ""),
        ];
        let prompt = leader_system_prompt(&leader, &specialists, 100);
        assert!(prompt.starts_with("You coordinate.\n\nAvailable specialist agents:\n"));
        assert!(prompt.contains(&format!("- coder (coder): {}...", "x".repeat(100))));
        assert!(prompt.contains("- researcher (researcher): General purpose"));
        assert!(prompt.contains("\"delegate\""));
    }

    #[test]
    fn leader_without_specialists_keeps_its_prompt() {
        let leader = agent("lead", AgentRole::Leader, "Solo.");
        assert_eq!(leader_system_prompt(&leader, &[], 100), "Solo.");
    }

    #[test]
    fn results_are_attributed() {
        let text = format_specialist_results(&[
            SpecialistReport {
                name: "coder".into(),
                role: "coder".into(),
                result: Ok("fn main() {}".into()),
            },
            SpecialistReport {
                name: "reviewer".into(),
                role: "reviewer".into(),
                result: Err("timed out".into()),
            },
        ]);
        assert!(text.contains("[coder (coder)]:\nfn main() {}"));
        assert!(text.contains("[reviewer (reviewer)] failed: timed out"));
    }
}
