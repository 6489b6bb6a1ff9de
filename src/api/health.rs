//! Shared health state for the /health endpoint.
//! Updated by the snapshot scheduler.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last successful snapshot (0 = none yet).
    pub last_snapshot_at: AtomicU64,
    /// Markets in the last successful snapshot.
    pub snapshot_markets: AtomicU64,
    /// Snapshot runs that failed since the last success.
    pub consecutive_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&self, at: u64, markets: u64) {
        self.last_snapshot_at.store(at, Ordering::Relaxed);
        self.snapshot_markets.store(markets, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the failure count including this one.
    pub fn record_snapshot_failure(&self) -> u64 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last_snapshot_at(&self) -> u64 {
        self.last_snapshot_at.load(Ordering::Relaxed)
    }

    pub fn snapshot_markets(&self) -> u64 {
        self.snapshot_markets.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
