//! C7, part 1 — even-spread rank normalization (spec §4.7).
//!
//! Maps the registry's raw scores onto evenly-spaced values in `[0, 1]`: the
//! most-correlated metric gets `1.0`, the least-correlated gets
//! `1 / unique_values`. `Value` requests and `MCP` output bypass this
//! (spec §4.7's "methods other than Value, formats other than MCP"): the
//! former because its score is a literal aggregate, not a similarity
//! measure; the latter because MCP sorts and truncates on the raw score
//! directly.

use crate::identity::MetricIdentity;
use crate::query::StoragePoint;
use crate::registry::{Registry, ResultFlags};
use crate::request::{OutputFormat, WeightsMethod};

#[derive(Debug, Clone)]
pub struct RankedResult {
    pub identity: MetricIdentity,
    pub score: f64,
    pub flags: ResultFlags,
    pub highlighted: StoragePoint,
    pub baseline: Option<StoragePoint>,
    pub duration_us: u64,
}

/// Produces the final score for every entry in `registry`.
///
/// When normalization applies, each entry's scaled value (pct-of-time
/// entries are first rescaled by `max_base_high_ratio` so the two score
/// families — base/high ratio and percentage-of-time — share one axis) is
/// looked up in the ascending, deduplicated array of all scaled values; its
/// score becomes `(ascending_index + 1) / unique_values.len()`. This is
/// algebraically the same transform as "count how many unique values are
/// strictly greater, then `1 - that_count / unique_values.len()`" (the
/// phrasing in spec §4.7), just computed from the other end of the sorted
/// array.
pub fn spread_evenly(
    registry: &Registry,
    method: WeightsMethod,
    format: OutputFormat,
    max_base_high_ratio: f64,
) -> Vec<RankedResult> {
    let entries: Vec<_> = registry.values().collect();

    if method == WeightsMethod::Value || format == OutputFormat::Mcp {
        return entries.into_iter().map(passthrough).collect();
    }

    if entries.is_empty() {
        return Vec::new();
    }

    let scaled: Vec<f64> = entries
        .iter()
        .map(|r| {
            if r.flags.contains(ResultFlags::PERCENTAGE_OF_TIME) {
                r.value * max_base_high_ratio
            } else {
                r.value
            }
        })
        .collect();

    let mut unique_values = scaled.clone();
    unique_values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    unique_values.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);

    // spec §9 open question: `(int)unique_values` truncates silently above
    // 2^31 in the original; practically unreachable (a registry with more
    // than two billion distinct scores), kept as a debug assertion rather
    // than a runtime-checked error, matching the preserved-as-is decision
    // in SPEC_FULL.md.
    debug_assert!(unique_values.len() <= i32::MAX as usize, "unique_values overflowed i32");

    let n = unique_values.len() as f64;

    entries
        .into_iter()
        .zip(scaled)
        .map(|(r, v)| {
            let index = unique_values.partition_point(|&u| u < v);
            let score = ((index as f64 + 1.0) / n).clamp(0.0, 1.0);
            RankedResult {
                identity: r.identity.clone(),
                score,
                flags: r.flags,
                highlighted: r.highlighted,
                baseline: r.baseline,
                duration_us: r.duration_us,
            }
        })
        .collect()
}

fn passthrough(r: &crate::registry::RegisteredResult) -> RankedResult {
    RankedResult {
        identity: r.identity.clone(),
        score: r.value,
        flags: r.flags,
        highlighted: r.highlighted,
        baseline: r.baseline,
        duration_us: r.duration_us,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::StoragePoint;

    fn reg_with(values: &[(&str, f64, ResultFlags)]) -> Registry {
        let mut registry = Registry::new();
        let mut stats = crate::registry::Stats::default();
        for (name, value, flags) in values {
            registry.insert(
                MetricIdentity::new("h1", "system.cpu", "cpu", *name),
                *value,
                *flags,
                StoragePoint::default(),
                None,
                &mut stats,
                true,
                0,
            );
        }
        registry
    }

    #[test]
    fn ranking_is_a_permutation() {
        let registry = reg_with(&[
            ("a", 0.1, ResultFlags::empty()),
            ("b", 0.5, ResultFlags::empty()),
            ("c", 0.9, ResultFlags::empty()),
        ]);
        let ranked = spread_evenly(&registry, WeightsMethod::Ks2, OutputFormat::Charts, 0.0);
        assert_eq!(ranked.len(), registry.len());
    }

    #[test]
    fn most_correlated_gets_one_least_gets_one_over_n() {
        let registry = reg_with(&[
            ("low", 0.1, ResultFlags::empty()),
            ("mid", 0.5, ResultFlags::empty()),
            ("high", 0.9, ResultFlags::empty()),
        ]);
        let ranked = spread_evenly(&registry, WeightsMethod::Ks2, OutputFormat::Charts, 0.0);
        let high = ranked.iter().find(|r| r.identity.metric == "high").unwrap();
        let low = ranked.iter().find(|r| r.identity.metric == "low").unwrap();
        assert!((high.score - 1.0).abs() < 1e-12);
        assert!((low.score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_values_share_the_same_rank() {
        let registry = reg_with(&[
            ("a", 0.5, ResultFlags::empty()),
            ("b", 0.5, ResultFlags::empty()),
            ("c", 0.9, ResultFlags::empty()),
        ]);
        let ranked = spread_evenly(&registry, WeightsMethod::Ks2, OutputFormat::Charts, 0.0);
        let a = ranked.iter().find(|r| r.identity.metric == "a").unwrap();
        let b = ranked.iter().find(|r| r.identity.metric == "b").unwrap();
        assert!((a.score - b.score).abs() < 1e-12);
    }

    #[test]
    fn percentage_of_time_entries_are_rescaled_by_max_base_high_ratio() {
        let registry = reg_with(&[
            ("pct", 0.5, ResultFlags::PERCENTAGE_OF_TIME),
            ("ratio", 1.0, ResultFlags::BASE_HIGH_RATIO),
        ]);
        // pct scaled = 0.5 * 2.0 = 1.0, tying with ratio's raw 1.0.
        let ranked = spread_evenly(&registry, WeightsMethod::Volume, OutputFormat::Charts, 2.0);
        let pct = ranked.iter().find(|r| r.identity.metric == "pct").unwrap();
        let ratio = ranked.iter().find(|r| r.identity.metric == "ratio").unwrap();
        assert!((pct.score - ratio.score).abs() < 1e-12);
        assert!((pct.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn value_method_bypasses_normalization() {
        let registry = reg_with(&[("a", 42.0, ResultFlags::empty())]);
        let ranked = spread_evenly(&registry, WeightsMethod::Value, OutputFormat::Charts, 0.0);
        assert!((ranked[0].score - 42.0).abs() < 1e-12);
    }

    #[test]
    fn mcp_format_bypasses_normalization_even_for_ks2() {
        let registry = reg_with(&[("a", 0.77, ResultFlags::empty())]);
        let ranked = spread_evenly(&registry, WeightsMethod::Ks2, OutputFormat::Mcp, 0.0);
        assert!((ranked[0].score - 0.77).abs() < 1e-12);
    }

    #[test]
    fn empty_registry_ranks_to_an_empty_vec() {
        let registry = Registry::new();
        let ranked = spread_evenly(&registry, WeightsMethod::Ks2, OutputFormat::Charts, 0.0);
        assert!(ranked.is_empty());
    }
}
