// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide embedding cache: LRU eviction, TTL expiry and per-key
//! request coalescing.
//!
//! Keys are `sha256(normalized_text \0 model)`. Normalization trims and
//! collapses runs of whitespace but preserves case. Provider errors are
//! never cached; the next caller simply tries again.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cortex_config::model::CacheConfig;
use cortex_core::types::EmbeddingRequest;
use cortex_core::{CortexError, ProviderAdapter};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

type CacheKey = [u8; 32];

struct Entry {
    vector: Arc<[f32]>,
    hits: u64,
    expires_at: Instant,
    /// Position in the recency index; larger is more recent.
    tick: u64,
}

#[derive(Default)]
struct Lru {
    entries: HashMap<CacheKey, Entry>,
    recency: BTreeMap<u64, CacheKey>,
    next_tick: u64,
}

impl Lru {
    fn touch(&mut self, key: &CacheKey) {
        self.next_tick += 1;
        let tick = self.next_tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, *key);
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.tick);
        }
    }

    fn pop_oldest(&mut self) -> bool {
        match self.recency.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Snapshot of cache effectiveness for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
}

pub struct EmbeddingCache {
    provider: Arc<dyn ProviderAdapter>,
    capacity: usize,
    ttl: Duration,
    lru: Mutex<Lru>,
    inflight: DashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("provider", &self.provider.name())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl EmbeddingCache {
    pub fn new(provider: Arc<dyn ProviderAdapter>, capacity: usize, ttl: Duration) -> Self {
        Self {
            provider,
            capacity: capacity.max(1),
            ttl,
            lru: Mutex::new(Lru::default()),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(provider: Arc<dyn ProviderAdapter>, config: &CacheConfig) -> Self {
        Self::new(provider, config.capacity, Duration::from_secs(config.ttl_secs))
    }

    /// Whether the backing provider can embed at all.
    pub fn is_available(&self) -> bool {
        self.provider.supports_embeddings()
    }

    /// Return the cached vector for `text` under `model`, computing and
    /// storing it on a miss.
    ///
    /// Concurrent callers for the same uncached key wait for the first
    /// computation instead of issuing their own.
    pub async fn get_or_compute(&self, text: &str, model: &str) -> Result<Arc<[f32]>, CortexError> {
        let key = cache_key(text, model);
        if let Some(vector) = self.lookup(&key) {
            return Ok(vector);
        }

        let gate = self
            .inflight
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // Another caller may have filled the slot while we waited.
        if let Some(vector) = self.lookup(&key) {
            self.inflight.remove_if(&key, |_, g| Arc::strong_count(g) <= 2);
            return Ok(vector);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cortex_embedding_cache_misses_total").increment(1);
        debug!(key = %hex::encode(&key[..6]), model, "embedding cache miss");

        let result = self
            .provider
            .embed(EmbeddingRequest {
                model: model.to_string(),
                input: normalize(text),
            })
            .await;
        let outcome = result.map(|response| {
            let vector: Arc<[f32]> = response.vector.into();
            self.insert(key, Arc::clone(&vector));
            vector
        });
        self.inflight.remove_if(&key, |_, g| Arc::strong_count(g) <= 2);
        outcome
    }

    fn locked(&self) -> MutexGuard<'_, Lru> {
        self.lru.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a live entry and records the hit; drops an expired one.
    fn lookup(&self, key: &CacheKey) -> Option<Arc<[f32]>> {
        let mut lru = self.locked();
        let expired = match lru.entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.expires_at <= Instant::now() => true,
            Some(entry) => {
                entry.hits += 1;
                false
            }
        };
        if expired {
            lru.remove(key);
            metrics::counter!("cortex_embedding_cache_expired_total").increment(1);
            return None;
        }
        lru.touch(key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cortex_embedding_cache_hits_total").increment(1);
        lru.entries.get(key).map(|e| Arc::clone(&e.vector))
    }

    fn insert(&self, key: CacheKey, vector: Arc<[f32]>) {
        let mut lru = self.locked();
        lru.remove(&key);
        lru.next_tick += 1;
        let tick = lru.next_tick;
        lru.entries.insert(
            key,
            Entry {
                vector,
                hits: 0,
                expires_at: Instant::now() + self.ttl,
                tick,
            },
        );
        lru.recency.insert(tick, key);

        let mut evicted = 0;
        while lru.entries.len() > self.capacity && lru.pop_oldest() {
            evicted += 1;
        }
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            metrics::counter!("cortex_embedding_cache_evictions_total").increment(evicted);
        }
        metrics::gauge!("cortex_embedding_cache_entries").set(lru.entries.len() as f64);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut lru = self.locked();
        let expired: Vec<CacheKey> = lru
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            lru.remove(key);
        }
        expired.len()
    }

    /// Per-entry hit count, for diagnostics and tests.
    pub fn entry_hits(&self, text: &str, model: &str) -> Option<u64> {
        self.locked()
            .entries
            .get(&cache_key(text, model))
            .map(|e| e.hits)
    }

    pub fn len(&self) -> usize {
        self.locked().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cache_key(text: &str, model: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update([0u8]);
    hasher.update(model.as_bytes());
    hasher.finalize().into()
}
