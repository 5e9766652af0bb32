//! Background write queue for the persistent tier.
//!
//! `set` and `invalidate` on the tiered cache never wait for disk. Jobs go
//! onto a bounded channel drained by a single worker task, which retries
//! each job a few times with linear backoff and then gives up. Outcomes are
//! counted so degraded mode is observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheKey};
use super::persistent::{PersistentTier, TierError};

/// Capacity of the job channel.
pub const QUEUE_CAPACITY: usize = 64;

/// Retry budget for a single job.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff × n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

enum WriteJob {
    Store(CacheKey, CacheEntry),
    Remove(CacheKey),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct WriteCounters {
    written: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the write queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    /// Jobs that eventually succeeded.
    pub written: u64,
    /// Retry attempts made.
    pub retried: u64,
    /// Jobs abandoned after the retry budget.
    pub failed: u64,
    /// Jobs never queued (queue full or worker stopped).
    pub dropped: u64,
}

/// Handle to the write queue. Cheap to clone.
#[derive(Clone)]
pub struct PersistWriter {
    tx: mpsc::Sender<WriteJob>,
    counters: Arc<WriteCounters>,
}

impl PersistWriter {
    /// Spawn the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        tier: Arc<dyn PersistentTier>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let counters = Arc::new(WriteCounters::default());
        tokio::spawn(run(tier, rx, policy, Arc::clone(&counters), shutdown));
        Self { tx, counters }
    }

    /// Queue a store job.
    pub fn store(&self, key: CacheKey, entry: CacheEntry) {
        self.enqueue(WriteJob::Store(key, entry));
    }

    /// Queue a remove job.
    pub fn remove(&self, key: CacheKey) {
        self.enqueue(WriteJob::Remove(key));
    }

    /// Wait until every job queued before this call has been processed.
    ///
    /// Returns immediately if the worker has stopped.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteJob::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WriteStats {
        WriteStats {
            written: self.counters.written.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, job: WriteJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Persistent cache write queue full, dropping job");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Persistent cache writer stopped, dropping job");
            }
        }
    }
}

async fn run(
    tier: Arc<dyn PersistentTier>,
    mut rx: mpsc::Receiver<WriteJob>,
    policy: RetryPolicy,
    counters: Arc<WriteCounters>,
    shutdown: CancellationToken,
) {
    debug!(tier = tier.name(), "Persistent cache writer started");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("Persistent cache writer received shutdown signal");
                break;
            }
            job = rx.recv() => {
                let Some(job) = job else {
                    debug!("Write queue closed, persistent cache writer stopping");
                    break;
                };
                match job {
                    WriteJob::Flush(done) => {
                        let _ = done.send(());
                    }
                    WriteJob::Store(key, entry) => {
                        let outcome = with_retry(&policy, &counters, || tier.store(&key, &entry)).await;
                        record(&counters, &key, "store", outcome);
                    }
                    WriteJob::Remove(key) => {
                        let outcome = with_retry(&policy, &counters, || tier.remove(&key)).await;
                        record(&counters, &key, "remove", outcome);
                    }
                }
            }
        }
    }
}

async fn with_retry<F, Fut>(
    policy: &RetryPolicy,
    counters: &WriteCounters,
    mut op: F,
) -> Result<(), TierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TierError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                debug!(attempt, error = %e, "Persistent cache write failed, retrying");
                counters.retried.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}

fn record(counters: &WriteCounters, key: &CacheKey, op: &str, outcome: Result<(), TierError>) {
    match outcome {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, op, error = %e, "Persistent cache write abandoned");
        }
    }
}
