//! Content cache keyed by delivery address and sequence id.
//!
//! Entries are never expired by time. A per-destination bound may be set,
//! in which case the smallest id is evicted first (the latest entry is
//! always kept).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ript_protocol::{ContentMessage, ContentRequestMessage, DeliveryAddress};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<DeliveryAddress, BTreeMap<i32, ContentMessage>>,
    latest: HashMap<DeliveryAddress, i32>,
}

/// Thread-safe content cache.
#[derive(Debug, Default)]
pub struct ContentCache {
    limit: Option<usize>,
    inner: Mutex<CacheInner>,
}

impl ContentCache {
    /// Creates an unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that keeps at most `limit` entries per destination.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
            inner: Mutex::default(),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `msg` and marks its id as the latest for its destination.
    ///
    /// An existing entry with the same id is replaced.
    pub fn add(&self, msg: ContentMessage) {
        let mut inner = self.lock();
        let id = msg.id;
        let to = msg.to.clone();

        let messages = inner.entries.entry(to.clone()).or_default();
        messages.insert(id, msg);

        if let Some(limit) = self.limit {
            while messages.len() > limit {
                let Some(oldest) = messages.keys().copied().find(|k| *k != id) else {
                    break;
                };
                messages.remove(&oldest);
                trace!(to = %to, id = oldest, "Evicted cached content");
            }
        }

        inner.latest.insert(to.clone(), id);
        debug!(to = %to, id, "Cached content");
    }

    /// Looks up content for `to`. An id of `-1` means the latest entry.
    ///
    /// Returns `None` when nothing is cached for the destination, when the
    /// id is absent, or when the stored content is empty.
    pub fn get(&self, to: &DeliveryAddress, id: i32) -> Option<ContentMessage> {
        let inner = self.lock();
        let messages = inner.entries.get(to).filter(|m| !m.is_empty())?;

        let id = if id == ContentRequestMessage::LATEST {
            *inner.latest.get(to)?
        } else {
            id
        };

        let msg = messages.get(&id)?;
        if msg.content.is_empty() {
            trace!(to = %to, id, "Cached content is empty");
            return None;
        }
        Some(msg.clone())
    }

    /// Latest id recorded for `to`.
    pub fn latest_id(&self, to: &DeliveryAddress) -> Option<i32> {
        self.lock().latest.get(to).copied()
    }

    /// Total number of cached entries across destinations.
    pub fn len(&self) -> usize {
        self.lock().entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and every latest-id record.
    pub fn flush(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.latest.clear();
        debug!("Content cache flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> DeliveryAddress {
        DeliveryAddress::new(s)
    }

    #[test]
    fn get_by_id_and_latest() {
        let cache = ContentCache::new();
        cache.add(ContentMessage::new("x", 1, b"a".to_vec()));
        cache.add(ContentMessage::new("x", 2, b"b".to_vec()));

        assert_eq!(cache.get(&addr("x"), 1).unwrap().content, b"a");
        assert_eq!(cache.get(&addr("x"), -1).unwrap().content, b"b");
        assert_eq!(cache.latest_id(&addr("x")), Some(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn latest_follows_insertion_not_magnitude() {
        let cache = ContentCache::new();
        cache.add(ContentMessage::new("x", 9, b"nine".to_vec()));
        cache.add(ContentMessage::new("x", 3, b"three".to_vec()));

        assert_eq!(cache.get(&addr("x"), -1).unwrap().id, 3);
    }

    #[test]
    fn misses() {
        let cache = ContentCache::new();
        assert!(cache.get(&addr("nowhere"), -1).is_none());

        cache.add(ContentMessage::new("x", 1, b"a".to_vec()));
        assert!(cache.get(&addr("x"), 7).is_none());
        assert!(cache.get(&addr("y"), 1).is_none());
    }

    #[test]
    fn empty_content_is_a_miss() {
        let cache = ContentCache::new();
        cache.add(ContentMessage::new("x", 1, Vec::new()));

        assert!(cache.get(&addr("x"), 1).is_none());
        assert!(cache.get(&addr("x"), -1).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn same_id_is_replaced() {
        let cache = ContentCache::new();
        cache.add(ContentMessage::new("x", 1, b"old".to_vec()));
        cache.add(ContentMessage::new("x", 1, b"new".to_vec()));

        assert_eq!(cache.get(&addr("x"), 1).unwrap().content, b"new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn flush_clears_everything() {
        let cache = ContentCache::new();
        cache.add(ContentMessage::new("x", 1, b"a".to_vec()));
        cache.add(ContentMessage::new("y", 1, b"b".to_vec()));
        cache.flush();

        assert!(cache.is_empty());
        assert!(cache.get(&addr("x"), -1).is_none());
        assert_eq!(cache.latest_id(&addr("y")), None);
    }

    #[test]
    fn limit_evicts_smallest_id() {
        let cache = ContentCache::with_limit(2);
        for id in 1..=3 {
            cache.add(ContentMessage::new("x", id, vec![id as u8]));
        }

        assert!(cache.get(&addr("x"), 1).is_none());
        assert!(cache.get(&addr("x"), 2).is_some());
        assert!(cache.get(&addr("x"), 3).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn limit_keeps_latest_even_when_smallest() {
        let cache = ContentCache::with_limit(1);
        cache.add(ContentMessage::new("x", 5, b"five".to_vec()));
        cache.add(ContentMessage::new("x", 1, b"one".to_vec()));

        assert_eq!(cache.get(&addr("x"), -1).unwrap().content, b"one");
        assert!(cache.get(&addr("x"), 5).is_none());
    }

    #[test]
    fn limit_is_per_destination() {
        let cache = ContentCache::with_limit(1);
        cache.add(ContentMessage::new("x", 1, b"a".to_vec()));
        cache.add(ContentMessage::new("y", 1, b"b".to_vec()));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.limit(), Some(1));
    }
}
