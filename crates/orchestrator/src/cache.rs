//! Result cache keyed by a fingerprint of the task description and configuration.
//!
//! Entries expire after their TTL. The map is bounded: once it grows past its
//! capacity, expired entries are purged first and then the least recently used
//! entries are evicted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use automation_core::AutomationConfig;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

struct CacheEntry {
    value: Value,
    expires_at: Instant,
    last_access: u64,
}

#[derive(Clone)]
pub struct ResultCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    capacity: usize,
    clock: Arc<AtomicU64>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hex SHA-256 over the normalized description and the canonical config JSON.
    ///
    /// The description is trimmed, whitespace runs collapse to one space and the
    /// text is lowercased. Object keys in the config are emitted in sorted order.
    pub fn fingerprint(description: &str, config: &AutomationConfig) -> String {
        let normalized = description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut canonical = String::new();
        match serde_json::to_value(config) {
            Ok(value) => write_canonical(&value, &mut canonical),
            // Serializing plain data cannot fail; fall back to the template name.
            Err(_) => canonical.push_str(&config.name),
        }

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        let now = Instant::now();
        let hit = self.entries.get_mut(fingerprint).and_then(|mut entry| {
            if entry.expires_at > now {
                entry.last_access = self.tick();
                Some(entry.value.clone())
            } else {
                None
            }
        });

        if hit.is_none() {
            self.entries
                .remove_if(fingerprint, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    pub fn set(&self, fingerprint: impl Into<String>, value: Value, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let entry = CacheEntry {
            value,
            expires_at,
            last_access: self.tick(),
        };
        self.entries.insert(fingerprint.into(), entry);

        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    fn evict(&self) {
        let swept = self.sweep();
        let mut evicted = 0;

        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_access)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        debug!(swept, evicted, capacity = self.capacity, "Cache over capacity");
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
