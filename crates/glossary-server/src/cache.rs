use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::CacheBackendKind;

/// Opaque byte-blob store for serialized indexes.
///
/// Object safe and `&self` only; implementations use interior mutability.
pub trait IndexCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` for `ttl`; returns whether the write took.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool;

    /// Returns whether a value was removed.
    fn delete(&self, key: &str) -> bool;

    /// Name for log lines.
    fn name(&self) -> &'static str;
}

pub fn cache_for(kind: CacheBackendKind) -> Arc<dyn IndexCache> {
    match kind {
        CacheBackendKind::Memory => Arc::new(MemoryCache::default()),
        CacheBackendKind::None => Arc::new(NullCache),
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Process-local cache with per-key expiry.
#[derive(Default)]
pub struct MemoryCache {
    slots: DashMap<String, Slot>,
}

impl MemoryCache {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl IndexCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            // The read guard must be gone before `remove_if` locks the shard.
            let slot = self.slots.get(key)?;
            if slot.expires_at.is_none_or(|at| at > now) {
                return Some(slot.value.clone());
            }
        }
        debug!("cache entry {key} expired");
        self.slots
            .remove_if(key, |_, slot| slot.expires_at.is_some_and(|at| at <= now));
        None
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        // A zero ttl means no expiry.
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        self.slots.insert(key.to_string(), Slot { value, expires_at });
        true
    }

    fn delete(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Stores nothing; every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl IndexCache for NullCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> bool {
        false
    }

    fn delete(&self, _key: &str) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
