//! Fixed-size tick caches with least-recently-used eviction.

/// Slots in the session history and the validation cache.
pub const CACHE_SLOTS: usize = 32;

struct Slot<K, V> {
    key: K,
    value: V,
    used: u64,
    expires: u64,
}

/// A ring of at most `capacity` entries keyed by `K`.
///
/// Ticks are milliseconds from the context clock. Expired entries are
/// dropped on lookup; a full ring evicts the entry used least recently.
pub struct TickCache<K, V> {
    slots: Vec<Slot<K, V>>,
    capacity: usize,
}

impl<K: PartialEq, V> TickCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert or replace `key`, valid for `ttl_ms` from `now`.
    pub fn insert(&mut self, key: K, value: V, now: u64, ttl_ms: u64) {
        let expires = now.saturating_add(ttl_ms);
        if let Some(slot) = self.slots.iter_mut().find(|s| s.key == key) {
            slot.value = value;
            slot.used = now;
            slot.expires = expires;
            return;
        }
        let slot = Slot {
            key,
            value,
            used: now,
            expires,
        };
        if self.slots.len() < self.capacity {
            self.slots.push(slot);
            return;
        }
        if let Some(lru) = self.slots.iter_mut().min_by_key(|s| s.used) {
            *lru = slot;
        }
    }

    /// Look up `key`, refreshing its use tick. An expired entry is removed.
    pub fn get(&mut self, key: &K, now: u64) -> Option<&V> {
        let idx = self.slots.iter().position(|s| s.key == *key)?;
        if self.slots[idx].expires <= now {
            self.slots.swap_remove(idx);
            return None;
        }
        self.slots[idx].used = now;
        Some(&self.slots[idx].value)
    }

    /// Find the first live entry whose value satisfies `pred`.
    pub fn find(&mut self, now: u64, pred: impl Fn(&K, &V) -> bool) -> Option<&V> {
        self.slots.retain(|s| s.expires > now);
        let slot = self.slots.iter_mut().find(|s| pred(&s.key, &s.value))?;
        slot.used = now;
        Some(&slot.value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.slots.iter().position(|s| s.key == *key)?;
        Some(self.slots.swap_remove(idx).value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_checked_on_lookup() {
        let mut cache = TickCache::new(4);
        cache.insert("a", 1, 1_000, 500);
        assert_eq!(cache.get(&"a", 1_499), Some(&1));
        assert_eq!(cache.get(&"a", 1_500), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_ring_evicts_least_recently_used() {
        let mut cache = TickCache::new(3);
        cache.insert(1, "one", 10, 1_000);
        cache.insert(2, "two", 20, 1_000);
        cache.insert(3, "three", 30, 1_000);
        // Touch 1 so that 2 becomes the oldest.
        assert!(cache.get(&1, 40).is_some());
        cache.insert(4, "four", 50, 1_000);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&2, 60).is_none());
        assert!(cache.get(&1, 60).is_some());
        assert!(cache.get(&4, 60).is_some());
    }

    #[test]
    fn test_replace_and_remove() {
        let mut cache = TickCache::new(CACHE_SLOTS);
        cache.insert("k", 1, 0, 100);
        cache.insert("k", 2, 0, 100);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find(50, |_, v| *v == 2), Some(&2));
        assert_eq!(cache.remove(&"k"), Some(2));
        assert!(cache.find(50, |_, _| true).is_none());
    }
}
