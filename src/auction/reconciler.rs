//! MultiSourceReconciler — merges trade records from the poll, stream and
//! history feeds into one deduplicated, timestamp-ordered list.
//!
//! The merge winner is decided by an explicit comparator, not arrival
//! order: stream beats poll beats history, and ties within a source keep
//! the most recently observed instance. A poll response landing after a
//! newer stream event therefore never overwrites it.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use super::types::TradeRecord;

// ─────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Retention cap on the merged feed (most recent entries kept).
    pub max_entries: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { max_entries: 50 }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("DP_MAX_FEED_ENTRIES") {
            if let Ok(n) = v.parse() {
                c.max_entries = n;
            }
        }
        c
    }
}

// ─────────────────────────────────────────────────────────
// Reconciler
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Observed {
    record: TradeRecord,
    /// Monotonic observation counter; higher = seen later.
    seq: u64,
}

/// The merge comparator. `Greater` means `a` wins over `b`.
fn prefer(a: &Observed, b: &Observed) -> Ordering {
    a.record
        .source
        .priority()
        .cmp(&b.record.source.priority())
        .then(a.seq.cmp(&b.seq))
}

#[derive(Debug, Default)]
pub struct MultiSourceReconciler {
    cfg: ReconcilerConfig,
    by_key: HashMap<String, Observed>,
    next_seq: u64,
}

impl MultiSourceReconciler {
    pub fn new(cfg: ReconcilerConfig) -> Self {
        Self {
            cfg,
            by_key: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Merge a batch. Idempotent: feeding the same batch twice produces the
    /// same merged result.
    pub fn merge(&mut self, batch: Vec<TradeRecord>) {
        for record in batch {
            self.next_seq += 1;
            let candidate = Observed {
                record,
                seq: self.next_seq,
            };
            let key = candidate.record.dedup_key();
            match self.by_key.get(&key) {
                Some(existing) if prefer(&candidate, existing) != Ordering::Greater => {
                    debug!(
                        "🔀 Keeping {} entry over late {} for {}",
                        existing.record.source.as_str(),
                        candidate.record.source.as_str(),
                        key,
                    );
                }
                _ => {
                    self.by_key.insert(key, candidate);
                }
            }
        }
        self.enforce_retention();
    }

    /// Merged feed, timestamp descending, capped to `max_entries`.
    pub fn snapshot(&self) -> Vec<TradeRecord> {
        let mut out: Vec<&Observed> = self.by_key.values().collect();
        out.sort_by(|a, b| {
            b.record
                .timestamp_ms
                .cmp(&a.record.timestamp_ms)
                .then(b.seq.cmp(&a.seq))
        });
        out.into_iter()
            .take(self.cfg.max_entries)
            .map(|o| o.record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Age out entries beyond the retention window. Keeps the backing map
    /// bounded at 4× the snapshot cap so long sessions don't grow it
    /// without limit.
    fn enforce_retention(&mut self) {
        let cap = self.cfg.max_entries.saturating_mul(4).max(1);
        if self.by_key.len() <= cap {
            return;
        }
        let mut stamps: Vec<(String, u64)> = self
            .by_key
            .iter()
            .map(|(k, o)| (k.clone(), o.record.timestamp_ms))
            .collect();
        stamps.sort_by_key(|(_, ts)| *ts);
        let excess = self.by_key.len() - cap;
        for (key, _) in stamps.into_iter().take(excess) {
            self.by_key.remove(&key);
        }
    }
}
