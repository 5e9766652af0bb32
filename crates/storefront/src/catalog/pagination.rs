//! Incremental batch pagination.
//!
//! The displayed products are always a prefix of the filtered list whose
//! length is `batches × batch_size`, capped at the list length. Loading
//! starts at one batch. Further batches come from an explicit "load more"
//! or from the trailing sentinel becoming visible; sentinel loads are
//! debounced so a sentinel that stays in view does not load everything at
//! once. "Load all" shows the rest and turns incremental loading off until
//! the next reset.

use std::time::{Duration, Instant};

/// Products per batch.
pub const BATCH_SIZE: usize = 12;

/// Minimum gap between sentinel-triggered loads.
pub const SENTINEL_DEBOUNCE: Duration = Duration::from_millis(300);

/// Pagination state for one filtered list.
#[derive(Debug, Clone)]
pub struct Pager {
    batch_size: usize,
    debounce: Duration,
    batches: usize,
    show_all: bool,
    last_load: Option<Instant>,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(BATCH_SIZE, SENTINEL_DEBOUNCE)
    }
}

impl Pager {
    /// Pager with a custom batch size (minimum one) and debounce window.
    #[must_use]
    pub fn new(batch_size: usize, debounce: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            debounce,
            batches: 1,
            show_all: false,
            last_load: None,
        }
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches currently requested.
    #[must_use]
    pub const fn batches(&self) -> usize {
        self.batches
    }

    #[must_use]
    pub const fn is_showing_all(&self) -> bool {
        self.show_all
    }

    /// Back to the first batch. Called whenever the filtered list changes.
    pub const fn reset(&mut self) {
        self.batches = 1;
        self.show_all = false;
        self.last_load = None;
    }

    /// How many of `total` filtered products are displayed.
    #[must_use]
    pub fn visible(&self, total: usize) -> usize {
        if self.show_all {
            return total;
        }
        self.batches.saturating_mul(self.batch_size).min(total)
    }

    /// Whether more products can be loaded incrementally.
    #[must_use]
    pub fn has_more(&self, total: usize) -> bool {
        !self.show_all && self.visible(total) < total
    }

    /// Append one batch. Returns whether anything was added.
    pub fn load_more(&mut self, total: usize) -> bool {
        self.load_more_at(total, Instant::now())
    }

    fn load_more_at(&mut self, total: usize, now: Instant) -> bool {
        if !self.has_more(total) {
            return false;
        }
        self.batches += 1;
        self.last_load = Some(now);
        true
    }

    /// The trailing sentinel became visible at `now`.
    ///
    /// Loads one batch unless the previous load was less than the debounce
    /// window ago. Returns whether a batch was loaded.
    pub fn on_sentinel_visible(&mut self, total: usize, now: Instant) -> bool {
        if let Some(last) = self.last_load
            && now.saturating_duration_since(last) < self.debounce
        {
            return false;
        }
        self.load_more_at(total, now)
    }

    /// Show everything and disable incremental loading.
    pub const fn load_all(&mut self) {
        self.show_all = true;
    }

    /// Request exactly `batches` batches (minimum one).
    pub fn set_batches(&mut self, batches: usize) {
        self.batches = batches.max(1);
    }
}
