//! In-process LRU tier.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::CacheEntry;

/// Cost-bounded least-recently-used map. Cost is the payload size.
pub(crate) struct MemoryTier {
    max_bytes: u64,
    state: Mutex<LruState>,
}

#[derive(Default)]
struct LruState {
    /// key -> (entry, recency tick)
    entries: HashMap<String, (CacheEntry, u64)>,
    /// recency tick -> key; the first entry is the least recently used
    order: BTreeMap<u64, String>,
    next_tick: u64,
    total_bytes: u64,
}

impl LruState {
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        if let Some((_, slot)) = self.entries.get_mut(key) {
            self.order.remove(slot);
            *slot = tick;
            self.order.insert(tick, key.to_string());
            self.next_tick += 1;
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let (entry, tick) = self.entries.remove(key)?;
        self.order.remove(&tick);
        self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.order.pop_first()?;
        let (entry, _) = self.entries.remove(&key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        Some(entry)
    }
}

impl MemoryTier {
    pub(crate) fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(LruState::default()),
        }
    }

    /// Look up an entry and mark it most recently used.
    pub(crate) fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        let entry = state.entries.get(key).map(|(entry, _)| entry.clone())?;
        state.touch(key);
        Some(entry)
    }

    /// Insert, evicting least recently used entries to stay within budget.
    /// An entry larger than the whole budget is not kept.
    pub(crate) fn insert(&self, key: &str, entry: CacheEntry) -> bool {
        let mut state = self.state.lock();
        state.remove(key);
        if entry.size > self.max_bytes {
            return false;
        }
        while state.total_bytes + entry.size > self.max_bytes {
            if state.pop_lru().is_none() {
                break;
            }
        }

        let tick = state.next_tick;
        state.next_tick += 1;
        state.total_bytes += entry.size;
        state.order.insert(tick, key.to_string());
        state.entries.insert(key.to_string(), (entry, tick));
        true
    }

    pub(crate) fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().remove(key)
    }

    pub(crate) fn clear(&self) {
        *self.state.lock() = LruState::default();
    }

    /// Drop entries expired at `now`; returns how many were dropped.
    pub(crate) fn clear_expired(&self, now: SystemTime) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, (entry, _))| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub(crate) fn usage(&self) -> u64 {
        self.state.lock().total_bytes
    }

    pub(crate) fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn entry(len: usize) -> CacheEntry {
        CacheEntry::new(Bytes::from(vec![b'x'; len]), Duration::from_secs(60), None)
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let tier = MemoryTier::new(30);
        tier.insert("a", entry(10));
        tier.insert("b", entry(10));
        tier.insert("c", entry(10));

        // touch a so b becomes the oldest
        assert!(tier.get("a").is_some());
        tier.insert("d", entry(10));

        assert!(tier.get("b").is_none());
        assert!(tier.get("a").is_some());
        assert!(tier.get("c").is_some());
        assert!(tier.get("d").is_some());
        assert_eq!(tier.usage(), 30);
    }

    #[test]
    fn test_oversized_entry_is_skipped() {
        let tier = MemoryTier::new(8);
        tier.insert("small", entry(4));
        assert!(!tier.insert("big", entry(9)));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.usage(), 4);
    }

    #[test]
    fn test_replace_updates_usage() {
        let tier = MemoryTier::new(100);
        tier.insert("a", entry(40));
        tier.insert("a", entry(10));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.usage(), 10);

        assert!(tier.remove("a").is_some());
        assert_eq!(tier.usage(), 0);
        assert!(tier.remove("a").is_none());
    }

    #[test]
    fn test_clear_expired() {
        let tier = MemoryTier::new(100);
        tier.insert("a", entry(1));
        let later = SystemTime::now() + Duration::from_secs(120);
        assert_eq!(tier.clear_expired(later), 1);
        assert_eq!(tier.len(), 0);
    }
}
