//! Capacity governor for `max_api_capacity`.
//!
//! Okta enforces rate limits per endpoint family and reports the state of
//! each bucket through `X-Rate-Limit-Limit`, `X-Rate-Limit-Remaining` and
//! `X-Rate-Limit-Reset`. The governor remembers the last report per bucket
//! and holds requests back once the provider has used its share of the
//! bucket, until the bucket resets.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Last rate-limit report for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch: i64,
}

/// Per-bucket throttle honouring `max_api_capacity`.
#[derive(Debug)]
pub struct CapacityGovernor {
    capacity: u32,
    buckets: Mutex<HashMap<String, RateLimitSnapshot>>,
}

impl CapacityGovernor {
    /// `capacity` is the percentage (1..=100) of each bucket the provider may use.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity.clamp(1, 100),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Record the headers of a response for `path`'s bucket.
    pub fn observe(&self, path: &str, snapshot: RateLimitSnapshot) {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.insert(bucket_key(path), snapshot);
        }
    }

    /// How long a request to `path` must wait before it may be sent.
    pub fn wait_for(&self, path: &str, now: DateTime<Utc>) -> Option<Duration> {
        if self.capacity >= 100 {
            return None;
        }
        let snapshot = {
            let buckets = self.buckets.lock().ok()?;
            *buckets.get(&bucket_key(path))?
        };

        let reserved = snapshot.limit as u64 * (100 - self.capacity) as u64 / 100;
        if snapshot.remaining as u64 > reserved {
            return None;
        }

        let wait = (snapshot.reset_epoch - now.timestamp()).max(0) as u64;
        if wait == 0 {
            return None;
        }
        debug!(
            "Throttling request to {}: {} of {} remaining, capacity {}%, waiting {}s",
            path, snapshot.remaining, snapshot.limit, self.capacity, wait
        );
        Some(Duration::from_secs(wait))
    }
}

/// Bucket key: the first three path segments, e.g. `/api/v1/groups`.
pub fn bucket_key(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .take(3)
        .collect();
    format!("/{}", segments.join("/"))
}
