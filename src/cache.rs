use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    last_purge: Instant,
}

/// Expiring key/value store shared by all in-flight requests. Values are
/// opaque; expired entries read as absent and are dropped lazily on read,
/// plus in bulk on write once `cleanup_interval` has elapsed since the last
/// purge. No background task required.
pub struct ExpiringCache<V> {
    inner: Mutex<Inner<V>>,
    default_ttl: Duration,
    cleanup_interval: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(default_ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_purge: Instant::now(),
            }),
            default_ttl,
            cleanup_interval,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CLEANUP_INTERVAL)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());

        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());

        if now.duration_since(inner.last_purge) >= self.cleanup_interval {
            inner.entries.retain(|_, entry| entry.expires_at > now);
            inner.last_purge = now;
        }

        inner.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .entries
            .len()
    }
}
