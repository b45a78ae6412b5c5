//! C5 — the result registry (spec §4.5).
//!
//! Grounded on the teacher's `storage::interner::StringInterner` for the
//! merge-by-value-wins semantics, and on `analysis::AnalysisReport`'s
//! accumulate-then-merge shape for the per-worker/global split.

use std::collections::HashMap;

use tracing::debug;

use crate::identity::MetricIdentity;
use crate::query::StoragePoint;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResultFlags: u8 {
        const BASE_HIGH_RATIO    = 1 << 0;
        const PERCENTAGE_OF_TIME = 1 << 1;
    }
}

/// One scored metric (spec §3 "RegisteredResult").
#[derive(Debug, Clone)]
pub struct RegisteredResult {
    pub identity: MetricIdentity,
    pub value: f64,
    pub flags: ResultFlags,
    pub highlighted: StoragePoint,
    pub baseline: Option<StoragePoint>,
    pub duration_us: u64,
}

/// Number of storage tiers a query can be attributed to (Netdata's
/// `RRD_STORAGE_TIERS`). `db_points_per_tier` is sized to this bound rather
/// than grown dynamically, matching the original's fixed-size array.
pub const MAX_STORAGE_TIERS: usize = 5;

/// Per-run counters, merged across worker threads by simple addition
/// (spec §5 "Shared resources").
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub max_base_high_ratio: f64,
    pub db_points: u64,
    pub result_points: u64,
    pub db_queries: u64,
    pub binary_searches: u64,
    pub db_points_per_tier: [u64; MAX_STORAGE_TIERS],
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            max_base_high_ratio: 0.0,
            db_points: 0,
            result_points: 0,
            db_queries: 0,
            binary_searches: 0,
            db_points_per_tier: [0; MAX_STORAGE_TIERS],
        }
    }
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.db_points += other.db_points;
        self.result_points += other.result_points;
        self.db_queries += other.db_queries;
        self.binary_searches += other.binary_searches;
        for (mine, theirs) in self.db_points_per_tier.iter_mut().zip(other.db_points_per_tier.iter()) {
            *mine += theirs;
        }
        if other.max_base_high_ratio > self.max_base_high_ratio {
            self.max_base_high_ratio = other.max_base_high_ratio;
        }
    }

    /// Attributes `points` db points read to `tier`, clamping silently for a
    /// tier outside `MAX_STORAGE_TIERS` rather than panicking — a caller
    /// passing an out-of-range tier still gets its points counted overall
    /// via `db_points`, just not broken out per-tier.
    pub fn add_tier_points(&mut self, tier: u8, points: u64) {
        if let Some(slot) = self.db_points_per_tier.get_mut(tier as usize) {
            *slot += points;
        }
    }
}

/// Thread-local (or global, after merge) multiset of [`RegisteredResult`]s
/// keyed by metric identity.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<u64, RegisteredResult>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: HashMap::new() }
    }

    /// Registers `value` for `identity`, dropping non-finite values, and
    /// (unless `register_zero`) dropping exact zero. `stats` is updated for
    /// `max_base_high_ratio` when [`ResultFlags::BASE_HIGH_RATIO`] is set,
    /// mirroring `register_result`'s side effect in the original.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        identity: MetricIdentity,
        value: f64,
        flags: ResultFlags,
        highlighted: StoragePoint,
        baseline: Option<StoragePoint>,
        stats: &mut Stats,
        register_zero: bool,
        duration_us: u64,
    ) {
        if !value.is_finite() {
            debug!(identity = %identity, value, "dropping non-finite scorer result (NumericAnomaly)");
            return;
        }
        let v = value.abs();
        if v == 0.0 && !register_zero {
            return;
        }
        if flags.contains(ResultFlags::BASE_HIGH_RATIO) && v > stats.max_base_high_ratio {
            stats.max_base_high_ratio = v;
        }

        let key = identity.key();
        self.entries.insert(
            key,
            RegisteredResult { identity, value: v, flags, highlighted, baseline, duration_us },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` into `self`, keeping the higher-valued entry on key
    /// collision. Associative in its final contents (only the max survives)
    /// even though insertion order across workers is not deterministic.
    pub fn merge(&mut self, other: Registry) {
        for (key, result) in other.entries {
            match self.entries.get(&key) {
                Some(existing) if existing.value >= result.value => {}
                _ => {
                    self.entries.insert(key, result);
                }
            }
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &RegisteredResult> {
        self.entries.values()
    }

    pub fn into_values(self) -> Vec<RegisteredResult> {
        self.entries.into_values().collect()
    }

    /// Iterates results sorted by `value`, ascending or descending.
    pub fn sorted_iter(&self, desc_by_value: bool) -> Vec<&RegisteredResult> {
        let mut v: Vec<&RegisteredResult> = self.entries.values().collect();
        v.sort_by(|a, b| {
            let ord = a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal);
            if desc_by_value {
                ord.reverse()
            } else {
                ord
            }
        });
        v
    }
}
