//! Bounded url -> ticket key cache.

use std::collections::{HashMap, VecDeque};

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Fixed-capacity mapping from upstream URL to the last matched downstream
/// key.
///
/// Eviction is FIFO by first insertion: re-inserting an existing URL replaces
/// its key but keeps its place in the eviction queue.
#[derive(Debug, Clone)]
pub struct IdentityCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, String>,
}

impl IdentityCache {
    /// Creates an empty cache. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Returns the cached key for `url`.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    /// Records `url -> key`, evicting the oldest entry when full.
    pub fn insert(&mut self, url: impl Into<String>, key: impl Into<String>) {
        let url = url.into();
        if let Some(existing) = self.entries.get_mut(&url) {
            *existing = key.into();
            return;
        }

        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(url.clone());
        self.entries.insert(url, key.into());
    }

    /// Drops the entry for `url`, if any.
    pub fn remove(&mut self, url: &str) -> Option<String> {
        let key = self.entries.remove(url)?;
        self.order.retain(|queued| queued != url);
        Some(key)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
