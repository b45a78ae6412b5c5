//! C2 — the KS2 scorer (spec §4.2).
//!
//! Two layers: [`ks_2samp`] operates on already-differenced, already-scaled
//! integer arrays (this is the layer the four canonical test vectors
//! exercise); [`ks2_score`] does the pair-differences transform on raw
//! windows and then calls it.

use crate::ks;
use crate::query::{MetricRef, QuerySource};
use crate::registry::ResultFlags;
use crate::scorer::ScoreOutcome;
use crate::window::Alignment;

/// Fixed-point scale applied to pair differences before truncating to
/// integers, so the joint traversal below can work in integer space.
pub const DOUBLE_TO_INT_MULTIPLIER: f64 = 100_000.0;

/// Index of the first element strictly greater than `k`, searching
/// `arr[left..]`. `arr` must be sorted ascending.
fn binary_search_bigger_than(arr: &[i64], left: usize, k: i64) -> usize {
    let mut left = left;
    let mut right = arr.len();
    while left < right {
        let middle = left + (right - left) / 2;
        if arr[middle] > k {
            right = middle;
        } else {
            left = middle + 1;
        }
    }
    left
}

/// Replaces a series with its array of consecutive differences, scaled to a
/// fixed-point integer: `diff[k] = (a[k] - a[k+1]) * DOUBLE_TO_INT_MULTIPLIER`.
/// Traverses from the end, matching the reference's backward walk.
pub fn pair_differences(values: &[f64]) -> Vec<i64> {
    if values.len() < 2 {
        return Vec::new();
    }
    let mut diffs = Vec::with_capacity(values.len() - 1);
    let mut idx = values.len() - 1;
    while idx > 0 {
        let second = values[idx];
        let first = values[idx - 1];
        diffs.push(((first - second) * DOUBLE_TO_INT_MULTIPLIER) as i64);
        idx -= 1;
    }
    diffs
}

/// Number of binary searches a call to [`ks_2samp`] performs, for the stats
/// counter (spec §4.2): `2(bn-1) + 2(hn-1)`.
pub fn binary_search_count(base_size: usize, high_size: usize) -> u64 {
    2 * (base_size.saturating_sub(1)) as u64 + 2 * (high_size.saturating_sub(1)) as u64
}

/// The KS2 probability between two pre-differenced integer arrays.
///
/// `base_shifts` is `log2` of how many times longer the baseline series is
/// than the highlight series (spec §3's alignment `shifts`); it rescales the
/// baseline's binary-search index so the two indices are directly
/// comparable without floating-point division in the hot loop.
pub fn ks_2samp(baseline_diffs: &mut [i64], highlight_diffs: &mut [i64], base_shifts: u32) -> f64 {
    baseline_diffs.sort_unstable();
    highlight_diffs.sort_unstable();

    let base_size = baseline_diffs.len();
    let high_size = highlight_diffs.len();

    let k = baseline_diffs[0];
    let base_idx = binary_search_bigger_than(baseline_diffs, 1, k);
    let high_idx = binary_search_bigger_than(highlight_diffs, 0, k);
    let mut delta = base_idx as i64 - ((high_idx as i64) << base_shifts);
    let mut min = delta;
    let mut max = delta;
    let mut base_min_idx = base_idx;
    let mut base_max_idx = base_idx;
    let mut high_min_idx = high_idx;
    let mut high_max_idx = high_idx;

    for i in 1..base_size {
        let k = baseline_diffs[i];
        let base_idx = binary_search_bigger_than(baseline_diffs, i + 1, k);
        let high_idx = binary_search_bigger_than(highlight_diffs, 0, k);
        delta = base_idx as i64 - ((high_idx as i64) << base_shifts);
        if delta < min {
            min = delta;
            base_min_idx = base_idx;
            high_min_idx = high_idx;
        } else if delta > max {
            max = delta;
            base_max_idx = base_idx;
            high_max_idx = high_idx;
        }
    }

    for i in 0..high_size {
        let k = highlight_diffs[i];
        let base_idx = binary_search_bigger_than(baseline_diffs, 0, k);
        let high_idx = binary_search_bigger_than(highlight_diffs, i + 1, k);
        delta = base_idx as i64 - ((high_idx as i64) << base_shifts);
        if delta < min {
            min = delta;
            base_min_idx = base_idx;
            high_min_idx = high_idx;
        } else if delta > max {
            max = delta;
            base_max_idx = base_idx;
            high_max_idx = high_idx;
        }
    }

    let dbase_size = base_size as f64;
    let dhigh_size = high_size as f64;
    let mut dmin = base_min_idx as f64 / dbase_size - high_min_idx as f64 / dhigh_size;
    let dmax = base_max_idx as f64 / dbase_size - high_max_idx as f64 / dhigh_size;

    dmin = -dmin;
    if dmin <= 0.0 {
        dmin = 0.0;
    } else if dmin >= 1.0 {
        dmin = 1.0;
    }

    let d = if dmin >= dmax { dmin } else { dmax };

    let en = (dbase_size * dhigh_size / (dbase_size + dhigh_size)).round();

    if en.is_nan() || en.is_infinite() || en == 0.0 || d.is_nan() || d.is_infinite() {
        return f64::NAN;
    }

    ks::ks_fbar(en as i64, d)
}

/// Pair-differences both windows, then scores them with [`ks_2samp`].
/// Returns `NaN` if either window has fewer than 2 points.
pub fn ks2_score(baseline: &[f64], highlight: &[f64], base_shifts: u32) -> f64 {
    let mut baseline_diffs = pair_differences(baseline);
    let mut highlight_diffs = pair_differences(highlight);

    if baseline_diffs.is_empty() || highlight_diffs.is_empty() {
        return f64::NAN;
    }

    ks_2samp(&mut baseline_diffs, &mut highlight_diffs, base_shifts)
}

/// Drives the highlight and baseline queries for one metric, scores them
/// with [`ks2_score`], and inverts the result (`1 - p`) so that larger
/// values mean "more correlated" — the survival probability itself runs
/// the other way (spec §4.7: "the engine must invert it at registration
/// time"). Returns `None` when either window has fewer than 2 samples or
/// the statistic is otherwise degenerate.
pub fn score(
    source: &dyn QuerySource,
    host: &str,
    metric: &MetricRef,
    after: i64,
    before: i64,
    alignment: &Alignment,
    tier: u8,
) -> Option<ScoreOutcome> {
    let highlight = source.query_series(host, metric, after, before, alignment.points, tier);
    let baseline_points = alignment.points << alignment.shifts;
    let baseline = source.query_series(
        host,
        metric,
        alignment.baseline_after,
        alignment.baseline_before,
        baseline_points,
        tier,
    );

    let p = ks2_score(&baseline.values, &highlight.values, alignment.shifts);
    if p.is_nan() {
        return None;
    }

    Some(ScoreOutcome {
        value: 1.0 - p,
        flags: ResultFlags::empty(),
        highlighted: highlight.storage_point,
        baseline: Some(baseline.storage_point),
        db_queries: 2,
        db_points: highlight.db_points + baseline.db_points,
        result_points: highlight.result_points + baseline.result_points,
        binary_searches: binary_search_count(baseline.values.len(), highlight.values.len()),
    })
}
