//! C4 — the Value / anomaly-rate scorer (spec §4.4).
//!
//! A single aggregate query per dimension; `AnomalyRate` forces the
//! anomaly bit on and reads back the anomaly rate instead of the plain
//! value. [`score_batch`] is the multi-dimensional fast path: one call to
//! [`crate::query::QuerySource::query_value_batch`] covering every
//! dimension in a context, instead of one `query_value` per metric.

use crate::query::{MetricRef, QuerySource};
use crate::registry::ResultFlags;
use crate::request::TimeGrouping;
use crate::scorer::ScoreOutcome;

fn outcome_from(q: &crate::query::QueryValue, anomaly_bit: bool) -> Option<ScoreOutcome> {
    let value = if anomaly_bit { q.anomaly_rate } else { q.value };
    if !value.is_finite() {
        return None;
    }
    Some(ScoreOutcome {
        value,
        flags: ResultFlags::empty(),
        highlighted: q.storage_point,
        baseline: None,
        db_queries: 1,
        db_points: q.db_points,
        result_points: q.result_points,
        binary_searches: 0,
    })
}

/// Scores a single dimension: the highlight window's aggregate (or
/// anomaly rate), registered unchanged.
pub fn score(
    source: &dyn QuerySource,
    host: &str,
    metric: &MetricRef,
    after: i64,
    before: i64,
    time_group: TimeGrouping,
    anomaly_bit: bool,
    tier: u8,
) -> Option<ScoreOutcome> {
    let q = source.query_value(host, metric, after, before, time_group, anomaly_bit, tier);
    outcome_from(&q, anomaly_bit)
}

/// Scores every dimension in `metrics` with one batched query instead of
/// `metrics.len()` individual ones (spec §4.4's multi-dimensional fast
/// path). `db_queries` is attributed to the first scored entry only, since
/// the whole batch came from a single round trip.
pub fn score_batch(
    source: &dyn QuerySource,
    host: &str,
    metrics: &[MetricRef],
    after: i64,
    before: i64,
    time_group: TimeGrouping,
    anomaly_bit: bool,
    tier: u8,
) -> Vec<(MetricRef, Option<ScoreOutcome>)> {
    let values = source.query_value_batch(host, metrics, after, before, time_group, anomaly_bit, tier);
    metrics
        .iter()
        .cloned()
        .zip(values.iter())
        .enumerate()
        .map(|(i, (metric, q))| {
            let outcome = outcome_from(q, anomaly_bit).map(|mut o| {
                o.db_queries = if i == 0 { 1 } else { 0 };
                o
            });
            (metric, outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mock::MockCollaborator;

    #[test]
    fn score_registers_the_plain_value() {
        let points: Vec<(i64, f64)> = (0..10).map(|i| (i * 10, 7.0)).collect();
        let mock = MockCollaborator::new().with_metric("h1", "system.cpu", "cpu", "user", points);
        let metric = &mock.metrics("h1")[0];
        let outcome =
            score(&mock, "h1", metric, 0, 100, TimeGrouping::Average, false, 0).expect("should score");
        assert!((outcome.value - 7.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_none_for_an_empty_window() {
        let mock = MockCollaborator::new().with_metric("h1", "system.cpu", "cpu", "user", vec![(0, 1.0)]);
        let metric = &mock.metrics("h1")[0];
        assert!(score(&mock, "h1", metric, 1000, 2000, TimeGrouping::Average, false, 0).is_none());
    }

    #[test]
    fn score_batch_matches_per_metric_scoring() {
        let mock = MockCollaborator::new()
            .with_metric("h1", "system.cpu", "cpu", "user", vec![(0, 1.0), (10, 2.0)])
            .with_metric("h1", "system.cpu", "cpu", "system", vec![(0, 3.0), (10, 4.0)]);
        let metrics = mock.metrics("h1");
        let batch = score_batch(&mock, "h1", &metrics, 0, 20, TimeGrouping::Average, false, 0);
        assert_eq!(batch.len(), 2);
        for (metric, outcome) in &batch {
            let single = score(&mock, "h1", metric, 0, 20, TimeGrouping::Average, false, 0).unwrap();
            assert!((outcome.as_ref().unwrap().value - single.value).abs() < 1e-9);
        }
    }
}
