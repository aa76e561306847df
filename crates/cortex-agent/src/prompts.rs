// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt assembly and response styles.
//!
//! The caller's page context (app, page, role, owner instructions, schema
//! hints, user) is folded into one system prompt. A [`ResponseStyle`] picks
//! both the sampling parameters and the closing guidance.

use std::collections::HashMap;

use cortex_core::types::SamplingParams;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Named sampling and tone preset.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    #[default]
    Default,
    Brief,
    Detailed,
    Technical,
    Creative,
}

impl ResponseStyle {
    pub fn params(self) -> SamplingParams {
        let (max_tokens, temperature, top_p, repeat_penalty, num_ctx) = match self {
            ResponseStyle::Default => (512, 0.7, 0.9, 1.1, 2048),
            ResponseStyle::Brief => (256, 0.3, 0.9, 1.2, 2048),
            ResponseStyle::Detailed => (1024, 0.5, 0.95, 1.1, 4096),
            ResponseStyle::Technical => (512, 0.2, 0.85, 1.15, 4096),
            ResponseStyle::Creative => (768, 0.8, 0.95, 1.0, 2048),
        };
        SamplingParams {
            max_tokens,
            temperature,
            top_p: Some(top_p),
            repeat_penalty: Some(repeat_penalty),
            num_ctx: Some(num_ctx),
        }
    }

    fn opening(self) -> &'static str {
        match self {
            ResponseStyle::Default => "You are a helpful AI assistant.",
            ResponseStyle::Brief => "You are a helpful AI assistant who keeps answers short.",
            ResponseStyle::Detailed => "You are a helpful AI assistant who explains things thoroughly.",
            ResponseStyle::Technical => "You are a technical AI assistant for developers.",
            ResponseStyle::Creative => "You are an imaginative AI assistant.",
        }
    }

    fn guidance(self) -> Option<&'static str> {
        match self {
            ResponseStyle::Default => None,
            ResponseStyle::Brief => Some(
                "Answer in two or three sentences unless the question needs more. \
                 Prefer bullet points for lists and skip preamble.",
            ),
            ResponseStyle::Detailed => Some(
                "Give complete answers with context and examples. \
                 Use headings to structure long answers.",
            ),
            ResponseStyle::Technical => Some(
                "Be precise and use correct terminology. \
                 Put code in fenced markdown blocks and skip basics unless asked.",
            ),
            ResponseStyle::Creative => Some(
                "Keep the tone engaging and conversational. \
                 Analogies and varied phrasing are welcome.",
            ),
        }
    }

    /// Full stand-alone prompt, used when no page context is supplied.
    pub fn prompt(self) -> String {
        match self.guidance() {
            Some(guidance) => format!("{} {guidance}", self.opening()),
            None => self.opening().to_string(),
        }
    }
}

/// Schema hint: a list of field names or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaHint {
    Fields(Vec<String>),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContext {
    pub name: Option<String>,
    pub plan: Option<String>,
}

/// Page context supplied by the embedding application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatContext {
    pub app: Option<String>,
    pub page: Option<String>,
    pub role: Option<String>,
    /// Free-form instructions from the application owner.
    pub instructions: Option<String>,
    pub schema: Option<SchemaHint>,
    pub user: Option<UserContext>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ChatContext {
    pub fn is_empty(&self) -> bool {
        present(&self.app).is_none()
            && present(&self.page).is_none()
            && present(&self.role).is_none()
            && present(&self.instructions).is_none()
            && self.schema.is_none()
            && self.user.is_none()
    }

    pub fn app(&self) -> Option<&str> {
        present(&self.app)
    }

    pub fn page(&self) -> Option<&str> {
        present(&self.page)
    }
}

const EXPORTEE_PERSONA: &str = "You are the AI assistant for Exportee, a platform for \
exporting and transforming data. For SQL, write read-only SELECT statements with explicit \
JOINs and suggest WHERE filters. For field mappings, suggest renames and type conversions \
and flag personal data (SSN, email, phone) that should be masked. The available widgets are \
mask_ssn, mask_email, filter, rename, redact, hash_pii and truncate_date; suggest chains \
such as masking PII before export. Keep answers short and technical, with SQL and JSON in \
code blocks.";

fn role_persona(role: &str) -> String {
    match role.to_ascii_lowercase().as_str() {
        "support" => "You help users with questions and troubleshooting.".to_string(),
        "sales" => "You help users understand products and make decisions.".to_string(),
        "onboarding" => "You guide new users through getting started.".to_string(),
        "technical" => "You provide technical assistance and documentation help.".to_string(),
        _ => format!("Your role is {role}."),
    }
}

/// Builds system prompts from page context, with per-application personas.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    personas: HashMap<String, String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptBuilder {
    /// Builder carrying the bundled application personas.
    pub fn builtin() -> Self {
        Self::empty().with_persona("exportee", EXPORTEE_PERSONA)
    }

    pub fn empty() -> Self {
        Self {
            personas: HashMap::new(),
        }
    }

    /// Register (or replace) the persona of an application. Names match
    /// case-insensitively.
    pub fn with_persona(mut self, app: &str, persona: impl Into<String>) -> Self {
        self.personas.insert(app.to_ascii_lowercase(), persona.into());
        self
    }

    pub fn build(&self, context: Option<&ChatContext>, style: ResponseStyle) -> String {
        let Some(context) = context.filter(|c| !c.is_empty()) else {
            return style.prompt();
        };

        let mut parts: Vec<String> = Vec::new();
        match context.app() {
            Some(app) => match self.personas.get(&app.to_ascii_lowercase()) {
                Some(persona) => parts.push(persona.clone()),
                None => parts.push(format!("You are the AI assistant for {app}.")),
            },
            None => parts.push(style.opening().to_string()),
        }
        if let Some(role) = present(&context.role) {
            parts.push(role_persona(role));
        }
        if let Some(page) = context.page() {
            parts.push(format!("The user is currently on the {page} page."));
        }
        if let Some(instructions) = present(&context.instructions) {
            parts.push(instructions.to_string());
        }
        match &context.schema {
            Some(SchemaHint::Fields(fields)) if !fields.is_empty() => {
                parts.push(format!("Available data: {}.", fields.join(", ")));
            }
            Some(SchemaHint::Text(text)) if !text.trim().is_empty() => {
                parts.push(text.trim().to_string());
            }
            _ => {}
        }
        if let Some(user) = &context.user {
            let mut about = Vec::new();
            if let Some(name) = present(&user.name) {
                about.push(format!("name is {name}"));
            }
            if let Some(plan) = present(&user.plan) {
                about.push(format!("on {plan} plan"));
            }
            if !about.is_empty() {
                parts.push(format!("The user's {}.", about.join(", ")));
            }
        }
        if let Some(guidance) = style.guidance() {
            parts.push(guidance.to_string());
        }
        parts.join(" ")
    }
}
