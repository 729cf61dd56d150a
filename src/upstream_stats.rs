use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters of calls made to the indexer.
#[derive(Debug)]
pub struct UpstreamStats {
    requests: AtomicU64,
    rate_limited: AtomicU64,
    failures: AtomicU64,
}

impl Default for UpstreamStats {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamStats {
    pub const fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UpstreamSnapshot {
        UpstreamSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UpstreamSnapshot {
    pub requests: u64,
    pub rate_limited: u64,
    pub failures: u64,
}

pub static UPSTREAM_STATS: UpstreamStats = UpstreamStats::new();
