//! In-process memory tier.
//!
//! Holds at most `max_items` entries. When an insert pushes the tier over
//! its cap, the entry with the lowest priority is evicted; among equal
//! priorities the oldest insertion goes first. The cap is small (around a
//! hundred entries) so eviction is a linear scan.
//!
//! Freshness is measured from when a slot was filled, not from the entry's
//! capture time. A value promoted from the persistent tier therefore gets a
//! full memory TTL while still reporting when it was originally fetched.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::entry::{CacheEntry, CacheKey, to_delta};

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    inserted_at: DateTime<Utc>,
    seq: u64,
}

impl Slot {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.inserted_at).max(TimeDelta::zero()) > to_delta(ttl)
    }
}

/// Memory tier storage. Not synchronised; the tiered cache wraps it in a mutex.
#[derive(Debug)]
pub struct MemoryTier {
    slots: HashMap<CacheKey, Slot>,
    max_items: usize,
    next_seq: u64,
}

impl MemoryTier {
    /// Create a tier holding at most `max_items` entries (minimum one).
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        Self {
            slots: HashMap::new(),
            max_items: max_items.max(1),
            next_seq: 0,
        }
    }

    /// Entry for `key`, or `None` if absent or held in memory longer than `ttl`.
    #[must_use]
    pub fn get(&self, key: &CacheKey, ttl: Duration, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.slots
            .get(key)
            .filter(|slot| !slot.is_expired(ttl, now))
            .map(|slot| slot.entry.clone())
    }

    /// Insert or overwrite `key`, fresh from the entry's capture time.
    /// Overwrites count as a new insertion for tie-breaking. Returns the
    /// evicted key, if any.
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheKey> {
        let inserted_at = entry.stored_at;
        self.insert_at(key, entry, inserted_at)
    }

    /// Like [`insert`](Self::insert), but fresh from `inserted_at`.
    pub fn insert_at(
        &mut self,
        key: CacheKey,
        entry: CacheEntry,
        inserted_at: DateTime<Utc>,
    ) -> Option<CacheKey> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            key,
            Slot {
                entry,
                inserted_at,
                seq,
            },
        );

        if self.slots.len() <= self.max_items {
            return None;
        }

        let victim = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| (slot.entry.priority, slot.seq))
            .map(|(key, _)| key.clone())?;
        self.slots.remove(&victim);
        Some(victim)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Drop every entry held longer than `max_age`. Returns how many were dropped.
    pub fn sweep(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(max_age, now));
        before - self.slots.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.contains_key(key)
    }
}
