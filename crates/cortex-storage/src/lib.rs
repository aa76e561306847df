// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Cortex engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer connection via `tokio-rusqlite`. Memory, agent and vault
//! tables are owned by their respective crates; this crate owns the schema
//! and the durable conversation-turn queue consumed by extraction.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{map_tr_err, Database};
pub use models::{TurnCounts, TurnRecord, TurnStatus};
