//! Response cache for batch evaluation runs
//!
//! A blake3-keyed in-memory cache so that identical one-shot invocations
//! within a single batch run hit the provider once. Lookups are
//! idempotent and entries are never invalidated mid-run; the cache dies
//! with the run. Streaming invocations are never cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use tandem_utils::error::ProviderError;

use crate::types::{ProviderBackend, ProviderInvocation, ProviderReply, TextStream};

/// Statistics for cache performance tracking
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Calculate cache hit ratio
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}

/// In-memory response cache keyed by invocation content.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, ProviderReply>>,
    stats: CacheStats,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Deterministic cache key over provider label, model and messages.
    ///
    /// Every field is length-prefixed before hashing so distinct message
    /// sequences can never collide by concatenation.
    #[must_use]
    pub fn cache_key(provider: &str, inv: &ProviderInvocation) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in [provider, inv.model.as_str()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        for message in &inv.messages {
            let role = format!("{:?}", message.role);
            for field in [role.as_str(), message.content.as_str()] {
                hasher.update(&(field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    fn get(&self, key: &str) -> Option<ProviderReply> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        let hit = entries.get(key).cloned();
        if hit.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn put(&self, key: String, reply: ProviderReply) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key, reply);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }
}

/// A wrapper around a `ProviderBackend` that serves repeated one-shot
/// invocations from a shared [`ResponseCache`].
pub struct CachedBackend {
    inner: Arc<dyn ProviderBackend>,
    cache: Arc<ResponseCache>,
    provider_label: String,
}

impl CachedBackend {
    #[must_use]
    pub fn new(
        inner: Arc<dyn ProviderBackend>,
        cache: Arc<ResponseCache>,
        provider_label: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            cache,
            provider_label: provider_label.into(),
        }
    }
}

#[async_trait]
impl ProviderBackend for CachedBackend {
    async fn invoke(&self, inv: ProviderInvocation) -> Result<ProviderReply, ProviderError> {
        let key = ResponseCache::cache_key(&self.provider_label, &inv);

        if let Some(reply) = self.cache.get(&key) {
            debug!(provider = %self.provider_label, key = %&key[..8], "Response cache hit");
            return Ok(reply);
        }

        let reply = self.inner.invoke(inv).await?;
        self.cache.put(key, reply.clone());
        Ok(reply)
    }

    async fn invoke_streaming(&self, inv: ProviderInvocation) -> Result<TextStream, ProviderError> {
        // Streaming sequences are non-restartable; pass through uncached
        self.inner.invoke_streaming(inv).await
    }
}
