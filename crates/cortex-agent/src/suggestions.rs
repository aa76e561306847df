// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context-aware quick-action suggestions.

use std::collections::HashMap;

use serde::Serialize;

use crate::prompts::{ChatContext, SchemaHint};

/// A suggested prompt: short button text plus the message it sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub label: String,
    pub prompt: String,
}

impl Suggestion {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSet {
    pub suggestions: Vec<Suggestion>,
    pub context_summary: Option<String>,
}

/// Suggestions keyed by application and by `app:page`.
///
/// Lookup order is page, then application, then the default list.
#[derive(Debug, Clone)]
pub struct SuggestionCatalog {
    by_page: HashMap<String, Vec<Suggestion>>,
    by_app: HashMap<String, Vec<Suggestion>>,
    fallback: Vec<Suggestion>,
}

impl Default for SuggestionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SuggestionCatalog {
    pub fn builtin() -> Self {
        let write_sql = Suggestion::new("Write SQL", "Help me write a SQL query for this export");
        let mask_pii = Suggestion::new("Mask PII", "What fields should I mask for compliance?");
        Self {
            by_page: HashMap::new(),
            by_app: HashMap::new(),
            fallback: vec![
                Suggestion::new("Get started", "How do I get started?"),
                Suggestion::new("Help", "What can you help me with?"),
            ],
        }
        .with_app(
            "exportee",
            vec![
                write_sql.clone(),
                mask_pii.clone(),
                Suggestion::new("Explain widgets", "Explain the available widget types"),
            ],
        )
        .with_page(
            "exportee",
            "exports",
            vec![
                write_sql,
                Suggestion::new("Filter data", "How do I filter the data in my query?"),
                Suggestion::new("Join tables", "How do I join multiple tables?"),
            ],
        )
        .with_page(
            "exportee",
            "export-builder",
            vec![
                Suggestion::new(
                    "Write SQL",
                    "Help me write a SQL query based on the available tables",
                ),
                mask_pii,
                Suggestion::new("Test query", "Help me test and validate my query"),
            ],
        )
        .with_page(
            "exportee",
            "mappings",
            vec![
                Suggestion::new("Add widget", "What widget should I use for this field?"),
                Suggestion::new("Mask SSN", "How do I mask SSN fields?"),
                Suggestion::new("Rename field", "How do I rename a field in the output?"),
            ],
        )
    }

    pub fn with_app(mut self, app: &str, suggestions: Vec<Suggestion>) -> Self {
        self.by_app.insert(app.to_ascii_lowercase(), suggestions);
        self
    }

    pub fn with_page(mut self, app: &str, page: &str, suggestions: Vec<Suggestion>) -> Self {
        self.by_page.insert(page_key(app, page), suggestions);
        self
    }

    pub fn suggest(&self, context: Option<&ChatContext>) -> SuggestionSet {
        let app = context.and_then(ChatContext::app);
        let page = context.and_then(ChatContext::page);

        let page_hit = app
            .zip(page)
            .and_then(|(app, page)| self.by_page.get(&page_key(app, page)));
        let app_hit = app.and_then(|app| self.by_app.get(&app.to_ascii_lowercase()));
        let suggestions = page_hit.or(app_hit).unwrap_or(&self.fallback).clone();

        SuggestionSet {
            suggestions,
            context_summary: context.and_then(context_summary),
        }
    }
}

fn page_key(app: &str, page: &str) -> String {
    format!("{}:{}", app.to_ascii_lowercase(), page.to_ascii_lowercase())
}

/// One-line description of a page context, `None` when nothing is set.
pub fn context_summary(context: &ChatContext) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(app) = context.app() {
        parts.push(format!("App: {app}"));
    }
    if let Some(page) = context.page() {
        parts.push(format!("Page: {page}"));
    }
    match &context.schema {
        Some(SchemaHint::Fields(fields)) if !fields.is_empty() => {
            let shown: Vec<&str> = fields.iter().take(5).map(String::as_str).collect();
            parts.push(format!("Schema: {}", shown.join(", ")));
        }
        Some(SchemaHint::Text(text)) if !text.trim().is_empty() => {
            let shown: String = text.chars().take(100).collect();
            parts.push(format!("Schema: {shown}"));
        }
        _ => {}
    }
    if let Some(name) = context
        .user
        .as_ref()
        .and_then(|u| u.name.as_deref())
        .filter(|n| !n.trim().is_empty())
    {
        parts.push(format!("User: {name}"));
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::UserContext;

    fn context(app: &str, page: Option<&str>) -> ChatContext {
        ChatContext {
            app: Some(app.into()),
            page: page.map(Into::into),
            ..ChatContext::default()
        }
    }

    #[test]
    fn page_beats_app_beats_default() {
        let catalog = SuggestionCatalog::builtin();

        let page = catalog.suggest(Some(&context("Exportee", Some("Mappings"))));
        assert_eq!(page.suggestions[0].label, "Add widget");

        let app = catalog.suggest(Some(&context("exportee", Some("billing"))));
        assert_eq!(app.suggestions[2].label, "Explain widgets");

        let fallback = catalog.suggest(None);
        assert_eq!(fallback.suggestions[0].label, "Get started");
        assert!(fallback.context_summary.is_none());
    }

    #[test]
    fn catalog_is_extensible() {
        let catalog = SuggestionCatalog::builtin()
            .with_app("shop", vec![Suggestion::new("Track order", "Where is my order?")])
            .with_page("shop", "cart", vec![Suggestion::new("Coupons", "Any coupons?")]);
        assert_eq!(
            catalog.suggest(Some(&context("shop", None))).suggestions[0].label,
            "Track order"
        );
        assert_eq!(
            catalog.suggest(Some(&context("shop", Some("cart")))).suggestions[0].label,
            "Coupons"
        );
    }

    #[test]
    fn summary_lists_first_five_fields() {
        let ctx = ChatContext {
            app: Some("shop".into()),
            page: Some("cart".into()),
            schema: Some(SchemaHint::Fields(
                ["a", "b", "c", "d", "e", "f"].map(String::from).to_vec(),
            )),
            user: Some(UserContext {
                name: Some("Ana".into()),
                plan: None,
            }),
            ..ChatContext::default()
        };
        assert_eq!(
            context_summary(&ctx).unwrap(),
            "App: shop | Page: cart | Schema: a, b, c, d, e | User: Ana"
        );
        assert!(context_summary(&ChatContext::default()).is_none());
    }
}
