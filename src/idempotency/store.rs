//! Per-client signature -> idempotency key map.

use super::key::{KeyGenerator, RequestSignature};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct StoredKey {
    key: String,
    created_at: Instant,
}

impl StoredKey {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Bounded map from request signature to the key issued for it.
///
/// Get-or-create is atomic: concurrent callers with the same signature see the
/// same key. Entries are removed on success, expire after `ttl`, and the least
/// recently used entry is evicted once `capacity` is reached.
pub struct IdempotencyKeyStore {
    entries: Mutex<LruCache<RequestSignature, StoredKey>>,
    ttl: Duration,
}

impl IdempotencyKeyStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<RequestSignature, StoredKey>> {
        // Entries are immutable strings; a panic elsewhere cannot leave them half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Existing key for `signature`, or a fresh one from the default generator.
    pub fn get_or_create(&self, signature: &RequestSignature) -> String {
        self.get_or_create_with(signature, &KeyGenerator::default())
    }

    pub fn get_or_create_with(&self, signature: &RequestSignature, generator: &KeyGenerator) -> String {
        let mut entries = self.lock();
        if let Some(stored) = entries.get(signature) {
            if !stored.is_expired(self.ttl) {
                debug!(signature = signature.as_str(), "reusing idempotency key");
                return stored.key.clone();
            }
        }

        let key = generator.generate();
        let evicted = entries.push(
            signature.clone(),
            StoredKey {
                key: key.clone(),
                created_at: Instant::now(),
            },
        );
        if let Some((old_sig, _)) = evicted {
            if &old_sig != signature {
                debug!(signature = old_sig.as_str(), "evicted idempotency key (capacity)");
            }
        }
        key
    }

    /// Live key for `signature`, if any. Does not create.
    pub fn get(&self, signature: &RequestSignature) -> Option<String> {
        let mut entries = self.lock();
        entries
            .get(signature)
            .filter(|s| !s.is_expired(self.ttl))
            .map(|s| s.key.clone())
    }

    /// Remove the mapping; returns whether one existed.
    pub fn clear(&self, signature: &RequestSignature) -> bool {
        self.lock().pop(signature).is_some()
    }

    pub fn contains(&self, signature: &RequestSignature) -> bool {
        self.lock()
            .peek(signature)
            .map(|s| !s.is_expired(self.ttl))
            .unwrap_or(false)
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let expired: Vec<RequestSignature> = entries
            .iter()
            .filter(|(_, s)| s.is_expired(self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for sig in &expired {
            entries.pop(sig);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

impl Default for IdempotencyKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::key::signature_of_value;

    fn sig(n: u32) -> RequestSignature {
        signature_of_value("POST", &format!("/orders/{}", n), None)
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = IdempotencyKeyStore::with_capacity(2);
        let k1 = store.get_or_create(&sig(1));
        store.get_or_create(&sig(2));
        // touch 1 so 2 becomes the eviction candidate
        assert_eq!(store.get_or_create(&sig(1)), k1);
        store.get_or_create(&sig(3));
        assert!(store.contains(&sig(1)));
        assert!(!store.contains(&sig(2)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_expired_entry_is_replaced() {
        let store = IdempotencyKeyStore::new().with_ttl(Duration::ZERO);
        let first = store.get_or_create(&sig(1));
        std::thread::sleep(Duration::from_millis(2));
        assert!(store.get(&sig(1)).is_none());
        let second = store.get_or_create(&sig(1));
        assert_ne!(first, second);
    }

    #[test]
    fn test_purge_expired() {
        let store = IdempotencyKeyStore::new().with_ttl(Duration::ZERO);
        store.get_or_create(&sig(1));
        store.get_or_create(&sig(2));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(IdempotencyKeyStore::with_capacity(0).capacity(), 1);
    }
}
