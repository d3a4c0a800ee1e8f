//! TTL-bounded "seen" set (spec §4.2).
//!
//! Maps `key -> insertion_time`. `check_and_mark` is atomic: two
//! concurrent callers racing on the same key never both observe `fresh`.
//! Entries older than the configured TTL are evicted lazily on access;
//! a max-entry cap evicts the oldest entries first to bound memory under
//! sustained load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeOutcome {
    Fresh,
    Duplicate,
}

struct Inner {
    // Insertion order is implicit in `seen`'s iteration only by luck with a
    // `HashMap`; we keep a side `order` vec of keys so oldest-first eviction
    // doesn't need to sort the whole map on every insert.
    seen: HashMap<String, Instant>,
    order: std::collections::VecDeque<String>,
}

pub struct Deduper {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
    evicted: AtomicU64,
}

impl Deduper {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashMap::new(),
                order: std::collections::VecDeque::new(),
            }),
            ttl,
            max_entries,
            evicted: AtomicU64::new(0),
        }
    }

    /// Entries dropped by either TTL expiry or the max-entry cap, for the
    /// observability layer (mirrors `SignalBus::dropped_count`).
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn from_config(cfg: &messaging_domain::config::DeduperConfig) -> Self {
        Self::new(cfg.ttl, cfg.max_entries)
    }

    /// Atomically check whether `key` has been seen within the TTL and, if
    /// not, mark it seen. Evicts expired entries and enforces the max-entry
    /// cap on the same critical section.
    pub fn check_and_mark(&self, key: &str) -> DedupeOutcome {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.evict_expired_locked(&mut inner, now);

        if let Some(seen_at) = inner.seen.get(key) {
            if now.duration_since(*seen_at) < self.ttl {
                return DedupeOutcome::Duplicate;
            }
        }

        inner.seen.insert(key.to_string(), now);
        inner.order.push_back(key.to_string());
        self.evict_over_capacity_locked(&mut inner);
        DedupeOutcome::Fresh
    }

    pub fn clear(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.seen.remove(key);
        inner.order.retain(|k| k != key);
    }

    pub fn seen(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .seen
            .get(key)
            .map(|seen_at| now.duration_since(*seen_at) < self.ttl)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired_locked(&self, inner: &mut Inner, now: Instant) {
        while let Some(front) = inner.order.front() {
            match inner.seen.get(front) {
                Some(seen_at) if now.duration_since(*seen_at) >= self.ttl => {
                    let key = inner.order.pop_front().unwrap();
                    inner.seen.remove(&key);
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                }
                Some(_) => break,
                None => {
                    inner.order.pop_front();
                }
            }
        }
    }

    fn evict_over_capacity_locked(&self, inner: &mut Inner) {
        while inner.seen.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_check_with_same_key_is_duplicate() {
        let deduper = Deduper::new(Duration::from_secs(300), 1000);
        assert_eq!(deduper.check_and_mark("a"), DedupeOutcome::Fresh);
        assert_eq!(deduper.check_and_mark("a"), DedupeOutcome::Duplicate);
    }

    #[test]
    fn expired_entry_is_fresh_again() {
        let deduper = Deduper::new(Duration::from_millis(10), 1000);
        assert_eq!(deduper.check_and_mark("a"), DedupeOutcome::Fresh);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(deduper.check_and_mark("a"), DedupeOutcome::Fresh);
    }

    #[test]
    fn max_entries_evicts_oldest_first() {
        let deduper = Deduper::new(Duration::from_secs(300), 2);
        deduper.check_and_mark("a");
        deduper.check_and_mark("b");
        deduper.check_and_mark("c");
        assert_eq!(deduper.len(), 2);
        // "a" was oldest and should have been evicted, so it reads fresh.
        assert_eq!(deduper.check_and_mark("a"), DedupeOutcome::Fresh);
    }

    #[test]
    fn eviction_count_tracks_both_ttl_and_capacity_drops() {
        let deduper = Deduper::new(Duration::from_millis(10), 2);
        deduper.check_and_mark("a");
        deduper.check_and_mark("b");
        deduper.check_and_mark("c");
        assert_eq!(deduper.evicted_count(), 1);

        std::thread::sleep(Duration::from_millis(25));
        deduper.check_and_mark("d");
        assert_eq!(deduper.evicted_count(), 3);
    }
}
