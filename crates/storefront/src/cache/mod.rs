//! Two-tier product cache.
//!
//! # Architecture
//!
//! - Memory tier: `HashMap` behind a `std::sync::Mutex`, never held across
//!   an `.await`. Fixed TTL on reads, capacity cap with priority eviction.
//! - Persistent tier: any [`PersistentTier`] (JSON files by default). Read on
//!   a memory miss and promoted into memory; written in the background by
//!   [`PersistWriter`].
//! - Sweeper: a task that periodically drops long-idle memory entries.
//!
//! The cache is owned by the application state and shared by `Arc`; there is
//! no global instance. Remote fetching is not the cache's job: a miss is
//! returned to the caller, which decides whether to hit the table-store.

mod clock;
mod entry;
mod memory;
mod persistent;
mod writer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{
    CacheEntry, CacheKey, CacheValue, PRIORITY_POPULARITY, PRIORITY_PRODUCT_DETAIL,
    PRIORITY_PRODUCT_LIST,
};
pub use memory::MemoryTier;
pub use persistent::{DisabledTier, FileTier, PersistentTier, TierError, open_or_disabled};
pub use writer::{PersistWriter, QUEUE_CAPACITY, RetryPolicy, WriteStats};

/// Cache tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Memory entries older than this are treated as absent.
    pub memory_ttl: Duration,
    /// Persistent entries older than this are treated as absent.
    pub persistent_ttl: Duration,
    /// Memory tier capacity.
    pub max_items: usize,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
    /// Memory entries older than this are removed by the sweeper.
    pub sweep_max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_ttl: Duration::from_secs(5 * 60),
            persistent_ttl: Duration::from_secs(24 * 60 * 60),
            max_items: 100,
            sweep_interval: Duration::from_secs(10 * 60),
            sweep_max_age: Duration::from_secs(30 * 60),
        }
    }
}

/// Tier that served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Memory,
    Persistent,
}

/// A successful cache read.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub value: CacheValue,
    pub tier: Tier,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheCounters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    swept: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub swept: u64,
    pub persistent_enabled: bool,
    pub writes: WriteStats,
}

/// Memory + persistent read-through cache.
pub struct TieredCache {
    memory: Mutex<MemoryTier>,
    persistent: Arc<dyn PersistentTier>,
    writer: PersistWriter,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    counters: CacheCounters,
}

impl TieredCache {
    /// Create a cache and spawn its write queue worker.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(
        settings: CacheSettings,
        persistent: Arc<dyn PersistentTier>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        let writer = PersistWriter::spawn(Arc::clone(&persistent), RetryPolicy::default(), shutdown);
        Self {
            memory: Mutex::new(MemoryTier::new(settings.max_items)),
            persistent,
            writer,
            clock,
            settings,
            counters: CacheCounters::default(),
        }
    }

    /// Memory-only cache on the wall clock.
    #[must_use]
    pub fn memory_only(settings: CacheSettings, shutdown: CancellationToken) -> Self {
        Self::new(settings, Arc::new(DisabledTier), Arc::new(SystemClock), shutdown)
    }

    /// Cache settings.
    #[must_use]
    pub const fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Whether a value captured at `stored_at` is older than the memory TTL.
    #[must_use]
    pub fn is_past_memory_ttl(&self, stored_at: DateTime<Utc>) -> bool {
        self.clock.now() - stored_at > entry::to_delta(self.settings.memory_ttl)
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read `key`: memory first, then the persistent tier.
    ///
    /// A fresh persistent entry is promoted into memory with its original
    /// priority. Its memory TTL starts at promotion, while
    /// [`Lookup::stored_at`] keeps reporting the original capture time.
    /// Persistent-tier errors count as a miss.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &CacheKey) -> Option<Lookup> {
        let now = self.clock.now();

        if let Some(entry) = self.memory().get(key, self.settings.memory_ttl, now) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Memory cache hit");
            return Some(Lookup {
                value: entry.value,
                tier: Tier::Memory,
                stored_at: entry.stored_at,
            });
        }

        let loaded = match self.persistent.load(key).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(tier = self.persistent.name(), error = %e, "Persistent cache read failed");
                None
            }
        };

        let now = self.clock.now();
        match loaded {
            Some(entry) if !entry.is_expired(self.settings.persistent_ttl, now) => {
                self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Persistent cache hit, promoting to memory");
                let lookup = Lookup {
                    value: entry.value.clone(),
                    tier: Tier::Persistent,
                    stored_at: entry.stored_at,
                };
                self.insert_memory(key.clone(), entry, now);
                Some(lookup)
            }
            _ => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss");
                None
            }
        }
    }

    /// Write `value` to memory now and queue the persistent write.
    pub fn set(&self, key: CacheKey, value: CacheValue, priority: u32) {
        let now = self.clock.now();
        let entry = CacheEntry::new(value, now, priority);
        if self.persistent.enabled() {
            self.writer.store(key.clone(), entry.clone());
        }
        self.insert_memory(key, entry, now);
    }

    fn insert_memory(&self, key: CacheKey, entry: CacheEntry, now: DateTime<Utc>) {
        let evicted = self.memory().insert_at(key, entry, now);
        if let Some(evicted) = evicted {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %evicted, "Evicted lowest-priority cache entry");
        }
    }

    /// Drop `key` from memory and queue its removal from the persistent tier.
    pub fn invalidate(&self, key: &CacheKey) {
        self.memory().remove(key);
        if self.persistent.enabled() {
            self.writer.remove(key.clone());
        }
    }

    /// Peek at the memory tier ignoring TTL. Used to serve a stale snapshot
    /// when a refresh was cancelled.
    #[must_use]
    pub fn peek_stale(&self, key: &CacheKey) -> Option<CacheValue> {
        self.memory()
            .get(key, Duration::MAX, self.clock.now())
            .map(|entry| entry.value)
    }

    /// Remove memory entries older than the sweep threshold.
    pub fn sweep(&self) -> usize {
        let removed = self
            .memory()
            .sweep(self.settings.sweep_max_age, self.clock.now());
        if removed > 0 {
            self.counters
                .swept
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept idle cache entries");
        }
        removed
    }

    /// Drop every memory entry. The persistent tier is left alone.
    pub fn clear_memory(&self) {
        self.memory().clear();
    }

    /// Wait for queued persistent writes to finish.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory().len(),
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.counters.persistent_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            swept: self.counters.swept.load(Ordering::Relaxed),
            persistent_enabled: self.persistent.enabled(),
            writes: self.writer.stats(),
        }
    }
}

/// Run [`TieredCache::sweep`] every `sweep_interval` until `shutdown` fires.
pub fn spawn_sweeper(cache: Arc<TieredCache>, shutdown: CancellationToken) -> JoinHandle<()> {
    let period = cache.settings.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(interval_secs = period.as_secs(), "Cache sweeper started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Cache sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    cache.sweep();
                }
            }
        }
    })
}
