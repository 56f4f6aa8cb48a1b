//! Process-wide snapshot cache over the transaction store.
//!
//! Holds one immutable, fully-loaded copy of every tenant's transactions.
//! A refresh builds a new [`Snapshot`] and publishes it with a single
//! pointer swap; readers always observe a complete snapshot, old or new.
//! Expired-TTL readers coalesce on one refresh instead of each starting
//! their own full-table load.

use crate::models::Transaction;
use crate::services::metrics::{record_cache_refresh, record_error, CACHE_ROWS, CACHE_STALE_READS};
use crate::services::store::TransactionStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Default maximum snapshot age before a read triggers a reload.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Minimum time between reload attempts after a failure, so cold-expired
/// traffic against a down store does not repeat the full-table load per
/// reader.
const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// One immutable, fully-loaded copy of the ledger at a point in time.
#[derive(Debug)]
pub struct Snapshot {
    pub rows: Vec<Transaction>,
    pub loaded_at: DateTime<Utc>,
    pub row_count: usize,
}

/// Observable cache condition for health reporting and monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub loaded: bool,
    pub row_count: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub stale: bool,
}

struct CacheSlot {
    snapshot: Option<Arc<Snapshot>>,
    /// Monotonic clock of the last successful publish; TTL is judged
    /// against this, not wall time.
    loaded_instant: Option<Instant>,
    /// Set when the most recent load attempt failed; gates retry backoff.
    last_failure: Option<Instant>,
}

pub struct SnapshotCache {
    store: Arc<dyn TransactionStore>,
    ttl: Duration,
    retry_interval: Duration,
    slot: RwLock<CacheSlot>,
    invalidated: AtomicBool,
    /// Serializes reloads; waiters re-check the slot after acquisition so
    /// a refresh storm performs exactly one backing-store load.
    refresh_guard: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn TransactionStore>, ttl: Duration) -> Self {
        Self::with_retry_interval(store, ttl, MIN_RETRY_INTERVAL)
    }

    pub fn with_retry_interval(
        store: Arc<dyn TransactionStore>,
        ttl: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            store,
            ttl,
            retry_interval,
            slot: RwLock::new(CacheSlot {
                snapshot: None,
                loaded_instant: None,
                last_failure: None,
            }),
            invalidated: AtomicBool::new(false),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Current published snapshot; reloads first when none is published,
    /// the TTL has lapsed, or [`invalidate`](Self::invalidate) was
    /// signalled.
    ///
    /// When a reload fails but an older snapshot exists, that snapshot is
    /// served and the failure is only logged: readers fail open. With no
    /// snapshot ever loaded the error is [`AppError::CacheUnavailable`].
    pub async fn get(&self) -> Result<Arc<Snapshot>, AppError> {
        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }

        // Slow path. All readers that saw an expired snapshot queue here;
        // whoever wins performs the load, the rest re-check and leave.
        let _guard = self.refresh_guard.lock().await;

        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }

        // A recent failed attempt with a previous snapshot available:
        // serve stale instead of hammering the store.
        {
            let slot = self.slot.read().await;
            if let (Some(snapshot), Some(failed)) = (&slot.snapshot, slot.last_failure) {
                if failed.elapsed() < self.retry_interval {
                    CACHE_STALE_READS.with_label_values(&["retry_backoff"]).inc();
                    return Ok(snapshot.clone());
                }
            }
        }

        match self.load_and_publish("ttl").await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let slot = self.slot.read().await;
                match &slot.snapshot {
                    Some(snapshot) => {
                        warn!(error = %e, "Snapshot reload failed, serving previous snapshot");
                        CACHE_STALE_READS
                            .with_label_values(&["refresh_failed"])
                            .inc();
                        Ok(snapshot.clone())
                    }
                    None => Err(AppError::CacheUnavailable(anyhow::anyhow!(
                        "no snapshot has ever loaded: {}",
                        e
                    ))),
                }
            }
        }
    }

    /// Explicit reload. Publishes atomically on success; on failure the
    /// previous snapshot stays published and the error goes to this
    /// caller only.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, AppError> {
        let _guard = self.refresh_guard.lock().await;
        self.load_and_publish("explicit").await
    }

    /// Mark the published snapshot stale without blocking. The next
    /// [`get`](Self::get) performs the reload; the write path never waits
    /// on one.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        debug!("Snapshot cache invalidated");
    }

    /// Proactive load so the first real request does not pay the full
    /// startup latency. Loads of tens of seconds at six-figure row counts
    /// are expected; callers decide whether a warm failure is fatal.
    #[instrument(skip(self))]
    pub async fn warm(&self) -> Result<Arc<Snapshot>, AppError> {
        let _guard = self.refresh_guard.lock().await;
        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }
        self.load_and_publish("warm").await
    }

    /// Cache condition for health endpoints: distinguishes "never loaded"
    /// from "serving but stale".
    pub async fn status(&self) -> CacheStatus {
        let slot = self.slot.read().await;
        let age = slot.loaded_instant.map(|at| at.elapsed());
        let ttl_lapsed = age.map(|a| a >= self.ttl).unwrap_or(true);
        CacheStatus {
            loaded: slot.snapshot.is_some(),
            row_count: slot.snapshot.as_ref().map(|s| s.row_count).unwrap_or(0),
            loaded_at: slot.snapshot.as_ref().map(|s| s.loaded_at),
            age_secs: age.map(|a| a.as_secs()),
            stale: self.invalidated.load(Ordering::SeqCst) || ttl_lapsed,
        }
    }

    /// The published snapshot, only while within TTL and not invalidated.
    async fn fresh_snapshot(&self) -> Option<Arc<Snapshot>> {
        if self.invalidated.load(Ordering::SeqCst) {
            return None;
        }
        let slot = self.slot.read().await;
        let snapshot = slot.snapshot.as_ref()?;
        let loaded = slot.loaded_instant?;
        if loaded.elapsed() < self.ttl {
            Some(snapshot.clone())
        } else {
            None
        }
    }

    /// Perform one load and publish the result. Caller must hold the
    /// refresh guard.
    async fn load_and_publish(&self, trigger: &str) -> Result<Arc<Snapshot>, AppError> {
        // Clear the flag before loading: an invalidation that lands while
        // the load is in flight re-marks the new snapshot stale.
        self.invalidated.store(false, Ordering::SeqCst);

        let started = Instant::now();
        match self.store.load_all_transactions().await {
            Ok(rows) => {
                let snapshot = Arc::new(Snapshot {
                    row_count: rows.len(),
                    loaded_at: Utc::now(),
                    rows,
                });
                {
                    let mut slot = self.slot.write().await;
                    slot.snapshot = Some(snapshot.clone());
                    slot.loaded_instant = Some(Instant::now());
                    slot.last_failure = None;
                }
                record_cache_refresh(trigger, "ok");
                CACHE_ROWS.set(snapshot.row_count as i64);
                info!(
                    row_count = snapshot.row_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    trigger = trigger,
                    "Snapshot published"
                );
                Ok(snapshot)
            }
            Err(e) => {
                // Keep the stale mark so the next read retries once the
                // backoff window passes.
                self.invalidated.store(true, Ordering::SeqCst);
                {
                    let mut slot = self.slot.write().await;
                    slot.last_failure = Some(Instant::now());
                }
                record_cache_refresh(trigger, "error");
                record_error("cache_refresh");
                warn!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    trigger = trigger,
                    "Snapshot load failed"
                );
                Err(e)
            }
        }
    }
}
