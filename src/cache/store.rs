//! Fragment cache with TTL, byte capacity and single-flight fetches.
//!
//! # Concurrency
//! - Reads go through `DashMap` shard read locks and never block each other
//! - Recency is an atomic tick per entry, so hits do not take write locks
//! - Inserts and capacity eviction are serialized by one short-held mutex
//! - Fetches for one fingerprint are collapsed by the [`SingleFlight`] registry

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::cache::fingerprint::Fingerprint;
use crate::cache::single_flight::{FlightRole, SharedFlight, SingleFlight};
use crate::error::{CacheError, FetchError};
use crate::fragment::response::FragmentResponse;
use crate::observability::metrics;

/// Outcome shared between every caller waiting on one fetch.
pub type FetchResult = Result<FragmentResponse, FetchError>;

/// A stored fragment response.
#[derive(Debug)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub response: FragmentResponse,
    pub expires_at: Instant,
    size: usize,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub entries: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
    pub in_flight: usize,
}

struct CacheInner {
    entries: DashMap<Fingerprint, CacheEntry>,
    in_flight: Arc<SingleFlight<Fingerprint, FetchResult>>,
    size_bytes: AtomicUsize,
    max_size_bytes: usize,
    access_clock: AtomicU64,
    eviction_lock: Mutex<()>,
}

/// Shared fragment cache. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct FragmentCache {
    inner: Arc<CacheInner>,
}

impl FragmentCache {
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: SingleFlight::new(),
                size_bytes: AtomicUsize::new(0),
                max_size_bytes,
                access_clock: AtomicU64::new(0),
                eviction_lock: Mutex::new(()),
            }),
        }
    }

    /// Look up an unexpired entry. The returned copy carries the remaining TTL.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<FragmentResponse> {
        let now = Instant::now();
        {
            let entry = self.inner.entries.get(fingerprint)?;
            if !entry.is_expired(now) {
                let tick = self.inner.access_clock.fetch_add(1, Ordering::Relaxed);
                entry.last_access.store(tick, Ordering::Relaxed);
                return Some(entry.response.with_ttl(entry.expires_at - now));
            }
        }

        // expired entries are purged lazily on read
        self.inner.remove_if_expired(fingerprint, now);
        None
    }

    /// Store `response` for `ttl`, evicting least-recently-used entries when
    /// the byte capacity would be exceeded.
    pub fn put(
        &self,
        fingerprint: Fingerprint,
        response: FragmentResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let size = fingerprint.size_bytes() + response.size_bytes();
        let capacity = self.inner.max_size_bytes;
        if size > capacity {
            return Err(CacheError::EntryTooLarge { size, capacity });
        }

        let now = Instant::now();
        let _guard = self
            .inner
            .eviction_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some((_, previous)) = self.inner.entries.remove(&fingerprint) {
            self.inner.size_bytes.fetch_sub(previous.size, Ordering::SeqCst);
        }

        if self.inner.size_bytes.load(Ordering::SeqCst) + size > capacity {
            self.inner.purge_expired(now);
        }
        while self.inner.size_bytes.load(Ordering::SeqCst) + size > capacity {
            if !self.inner.evict_least_recently_used() {
                break;
            }
        }

        let tick = self.inner.access_clock.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.insert(
            fingerprint.clone(),
            CacheEntry {
                fingerprint,
                response,
                expires_at: now + ttl,
                size,
                last_access: AtomicU64::new(tick),
            },
        );
        self.inner.size_bytes.fetch_add(size, Ordering::SeqCst);
        self.inner.report_size();
        Ok(())
    }

    /// Join the in-flight fetch for `fingerprint` or start one with `fetch`.
    ///
    /// A successful cacheable result is stored before waiters are released.
    pub fn fetch_once<F>(&self, fingerprint: Fingerprint, fetch: F) -> (SharedFlight<FetchResult>, FlightRole)
    where
        F: FnOnce() -> BoxFuture<'static, FetchResult>,
    {
        let cache = self.clone();
        let key = fingerprint.clone();
        self.inner.in_flight.join_or_start(fingerprint, move || -> BoxFuture<'static, FetchResult> {
            // a flight may have finished between the caller's miss and now
            if let Some(hit) = cache.get(&key) {
                return Box::pin(futures_util::future::ready(Ok(hit)));
            }

            let work = fetch();
            Box::pin(async move {
                let result = work.await;
                if let Ok(response) = &result {
                    if response.cacheable {
                        if let Err(e) = cache.put(key.clone(), response.clone(), response.ttl) {
                            tracing::warn!(fingerprint = %key, error = %e, "Fragment not cached");
                        }
                    }
                }
                result
            })
        })
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let purged = self.inner.purge_expired(Instant::now());
        if purged > 0 {
            self.inner.report_size();
        }
        purged
    }

    pub fn clear(&self) {
        let _guard = self
            .inner
            .eviction_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.entries.clear();
        self.inner.size_bytes.store(0, Ordering::SeqCst);
        self.inner.report_size();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.size_bytes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            entries: self.len(),
            size_bytes: self.size_bytes(),
            max_size_bytes: self.inner.max_size_bytes,
            in_flight: self.inner.in_flight.in_flight(),
        }
    }

    /// Spawn the periodic expiry sweep.
    ///
    /// The task ends on shutdown or once every cache handle has been dropped.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = cache.upgrade() else { break };
                        let purged = inner.purge_expired(Instant::now());
                        if purged > 0 {
                            inner.report_size();
                            tracing::debug!(purged, remaining = inner.entries.len(), "Cache sweep");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            tracing::debug!("Cache sweeper stopped");
        })
    }
}

impl CacheInner {
    fn remove_if_expired(&self, fingerprint: &Fingerprint, now: Instant) {
        if let Some((_, entry)) = self
            .entries
            .remove_if(fingerprint, |_, entry| entry.is_expired(now))
        {
            self.size_bytes.fetch_sub(entry.size, Ordering::SeqCst);
            self.report_size();
        }
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                self.size_bytes.fetch_sub(entry.size, Ordering::SeqCst);
                purged += 1;
            }
            keep
        });
        purged
    }

    fn evict_least_recently_used(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        let Some(fingerprint) = oldest else {
            return false;
        };
        if let Some((_, entry)) = self.entries.remove(&fingerprint) {
            self.size_bytes.fetch_sub(entry.size, Ordering::SeqCst);
            tracing::debug!(fingerprint = %fingerprint, "Evicted least recently used fragment");
        }
        true
    }

    fn report_size(&self) {
        metrics::record_cache_size(self.entries.len(), self.size_bytes.load(Ordering::SeqCst));
    }
}
