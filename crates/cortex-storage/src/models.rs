// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the conversation-turn queue.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle of a turn in the extraction queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Processing,
    Completed,
    /// Nothing worth extracting (too short, empty model output).
    Skipped,
    Failed,
}

/// A conversation turn as stored in `conversation_turns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: i64,
    pub tenant_id: String,
    pub session_id: String,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub status: TurnStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: String,
}

/// Queue depth by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}
