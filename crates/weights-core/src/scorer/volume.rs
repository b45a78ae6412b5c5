//! C3 — the Volume/countif scorer (spec §4.3).
//!
//! Three queries per metric (baseline average, highlight average, a
//! `COUNTIF` over the highlight window), combined into a score whose flag
//! records which of the two formulas produced it — `BaseHighRatio` when the
//! baseline average is nonzero, `PercentageOfTime` when it is zero and the
//! score degenerates to the countif fraction alone.

use crate::query::{Comparison, MetricRef, QuerySource};
use crate::registry::ResultFlags;
use crate::request::TimeGrouping;
use crate::scorer::ScoreOutcome;

/// Combines a baseline average, highlight average and countif percentage
/// into `(score, flags)`, per spec §4.3 step 6. Split out from [`score`]
/// so the four-case arithmetic (spec §8 scenarios 5 and 6) is testable
/// without a [`QuerySource`].
fn combine(baseline_avg: f64, highlight_avg: f64, countif_pct: f64) -> (f64, ResultFlags) {
    let countif = countif_pct / 100.0;
    if baseline_avg != 0.0 {
        (((highlight_avg - baseline_avg) / baseline_avg) * countif, ResultFlags::BASE_HIGH_RATIO)
    } else {
        (countif, ResultFlags::PERCENTAGE_OF_TIME)
    }
}

/// Drives the baseline average, highlight average and countif queries for
/// one metric and scores them, per spec §4.3. Returns `None` at any of the
/// "abort this metric" steps (no highlight signal, no baseline/highlight
/// difference, an anomaly-bit request whose highlight average did not
/// increase, or a countif query that came back empty).
#[allow(clippy::too_many_arguments)]
pub fn score(
    source: &dyn QuerySource,
    host: &str,
    metric: &MetricRef,
    after: i64,
    before: i64,
    baseline_after: i64,
    baseline_before: i64,
    time_group: TimeGrouping,
    anomaly_bit: bool,
    tier: u8,
) -> Option<ScoreOutcome> {
    let baseline_q =
        source.query_value(host, metric, baseline_after, baseline_before, time_group, anomaly_bit, tier);
    let baseline_avg = if baseline_q.value.is_nan() { 0.0 } else { baseline_q.value };

    let highlight_q = source.query_value(host, metric, after, before, time_group, anomaly_bit, tier);
    if highlight_q.value.is_nan() {
        return None;
    }
    let highlight_avg = highlight_q.value;

    if baseline_avg == highlight_avg {
        return None;
    }
    if anomaly_bit && highlight_avg < baseline_avg {
        return None;
    }

    let comparison = if highlight_avg > baseline_avg { Comparison::GreaterThan } else { Comparison::LessThan };
    let countif_q = source.query_countif(host, metric, after, before, comparison, baseline_avg, tier);
    if countif_q.value.is_nan() {
        return None;
    }

    let (value, flags) = combine(baseline_avg, highlight_avg, countif_q.value);

    Some(ScoreOutcome {
        value,
        flags,
        highlighted: highlight_q.storage_point,
        baseline: Some(baseline_q.storage_point),
        db_queries: 3,
        db_points: baseline_q.db_points + highlight_q.db_points + countif_q.db_points,
        result_points: baseline_q.result_points + highlight_q.result_points + countif_q.result_points,
        binary_searches: 0,
    })
}
