// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for idempotent provider calls.
//!
//! Only embeddings and health probes go through [`RetryPolicy::run`].
//! Generation is never retried.

use std::future::Future;
use std::time::Duration;

use cortex_config::model::RetryConfig;
use cortex_core::CortexError;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Run `op`, retrying while it fails with a retryable error and attempts
    /// remain. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, provider: &str, mut op: F) -> Result<T, CortexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CortexError>>,
    {
        let mut attempt = 1;
        let mut delay = self.initial_backoff;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
