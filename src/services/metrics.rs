//! Process-scoped guard counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Read-only view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub blocks: u64,
    pub warns: u64,
    pub tokens_saved: u64,
    pub cost_saved_usd: f64,
}

/// Additive counters shared by every session of one engine.
///
/// `tokens_saved = blocks * avg_tokens_per_attempt` and
/// `cost_saved_usd = tokens_saved * usd_per_token`.
#[derive(Debug)]
pub struct GuardMetrics {
    blocks: AtomicU64,
    warns: AtomicU64,
    avg_tokens_per_attempt: u64,
    usd_per_token: f64,
}

impl GuardMetrics {
    pub fn new(avg_tokens_per_attempt: u64, usd_per_token: f64) -> Self {
        Self {
            blocks: AtomicU64::new(0),
            warns: AtomicU64::new(0),
            avg_tokens_per_attempt,
            usd_per_token,
        }
    }

    pub fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warn(&self) {
        self.warns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let blocks = self.blocks.load(Ordering::Relaxed);
        let tokens_saved = blocks.saturating_mul(self.avg_tokens_per_attempt);
        MetricsSnapshot {
            blocks,
            warns: self.warns.load(Ordering::Relaxed),
            tokens_saved,
            cost_saved_usd: tokens_saved as f64 * self.usd_per_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_and_cost_derive_from_blocks() {
        let metrics = GuardMetrics::new(2_000, 0.000_003);
        for _ in 0..3 {
            metrics.record_block();
        }
        metrics.record_warn();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks, 3);
        assert_eq!(snapshot.warns, 1);
        assert_eq!(snapshot.tokens_saved, 6_000);
        assert!((snapshot.cost_saved_usd - 0.018).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = GuardMetrics::new(100, 0.01).snapshot();
        assert_eq!(snapshot.blocks, 0);
        assert_eq!(snapshot.tokens_saved, 0);
        assert_eq!(snapshot.cost_saved_usd, 0.0);
    }
}
