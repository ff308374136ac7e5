//! Time-to-live cache in front of the feed source.
//!
//! Readers get an `Arc` to an immutable [`FeedSnapshot`]; a refresh builds a
//! new snapshot and swaps it in together with its timestamp, so a reader
//! holding the old one keeps a consistent view until it drops it.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::TreeError;
use crate::source::{Feed, FeedSource};

/// Every feed from one fetch round, in configuration order.
#[derive(Debug)]
pub struct FeedSnapshot {
    feeds: Vec<Feed>,
    fetched_at: DateTime<Utc>,
}

impl FeedSnapshot {
    pub fn new(feeds: Vec<Feed>) -> Self {
        Self {
            feeds,
            fetched_at: Utc::now(),
        }
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Monotonic time source, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Cached {
    snapshot: Arc<FeedSnapshot>,
    refreshed: Instant,
}

/// Serves the last successful snapshot until it is older than the TTL.
///
/// At most one refresh runs at a time. A caller that finds the cache stale
/// while another caller is refreshing waits for that refresh and then uses
/// its result.
pub struct FeedCache {
    source: Arc<dyn FeedSource>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Cached>>,
    refresh: Mutex<()>,
}

impl FeedCache {
    pub fn new(source: Arc<dyn FeedSource>, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn FeedSource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            ttl,
            clock,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current feed set, refreshing it first if it has expired.
    ///
    /// A failed refresh leaves the cached snapshot and its timestamp alone,
    /// so the TTL keeps counting from the last success and the next call
    /// retries.
    pub fn snapshot(&self) -> Result<Arc<FeedSnapshot>, TreeError> {
        if let Some(snapshot) = self.fresh() {
            debug!("feed cache hit");
            return Ok(snapshot);
        }

        let _gate = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);

        // Someone else may have refreshed while we waited for the gate.
        if let Some(snapshot) = self.fresh() {
            debug!("feed cache refreshed by a concurrent caller");
            return Ok(snapshot);
        }

        let feeds = self.source.fetch_all().map_err(|e| {
            warn!(error = %format!("{e:#}"), "feed refresh failed");
            TreeError::SourceUnavailable(e)
        })?;

        let snapshot = Arc::new(FeedSnapshot::new(feeds));
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(Cached {
            snapshot: Arc::clone(&snapshot),
            refreshed: self.clock.now(),
        });
        info!(
            feeds = snapshot.len(),
            fetched_at = %snapshot.fetched_at(),
            "refreshed feed snapshot"
        );
        Ok(snapshot)
    }

    fn fresh(&self) -> Option<Arc<FeedSnapshot>> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let cached = current.as_ref()?;
        let age = self.clock.now().saturating_duration_since(cached.refreshed);
        (age < self.ttl).then(|| Arc::clone(&cached.snapshot))
    }
}
