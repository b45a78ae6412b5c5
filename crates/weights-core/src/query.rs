//! The external collaborator contract (spec §6.3).
//!
//! The storage/catalog engine lives outside this crate; the coordinator
//! reaches it only through [`QuerySource`] and the `foreach_*` callbacks
//! here. Grounded on the real-vs-mock split in the teacher's
//! `collector::traits::FileSystem` (`RealFs` for production, `MockFs` for
//! tests) — here there is no "real" implementation at all, since the
//! storage engine is explicitly out of scope; only [`MockCollaborator`]
//! exists, for tests and the demo CLI.

use crate::request::TimeGrouping;

/// `(min, max, sum, count, anomaly_count)` summary of a window of samples
/// (spec §3). `count == 0` means the point is unset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StoragePoint {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
    pub anomaly_count: u64,
}

impl StoragePoint {
    pub fn is_unset(&self) -> bool {
        self.count == 0
    }
}

/// Result of [`QuerySource::query_series`]: an equal-stride sampled series
/// plus the summary point it was drawn from.
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub values: Vec<f64>,
    pub storage_point: StoragePoint,
    pub db_points: u64,
    pub result_points: u64,
}

/// Result of [`QuerySource::query_value`] / [`QuerySource::query_countif`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryValue {
    pub value: f64,
    pub anomaly_rate: f64,
    pub storage_point: StoragePoint,
    pub db_points: u64,
    pub result_points: u64,
    pub duration_us: u64,
}

/// One leaf metric identity as seen by the catalog, before it is wrapped
/// into a [`crate::identity::MetricIdentity`] for the registry.
#[derive(Debug, Clone)]
pub struct MetricRef {
    pub host: String,
    pub context: String,
    pub instance: String,
    pub metric: String,
}

/// The query-interface contract the coordinator (C6) is written against.
/// A real implementation talks to the time-series storage engine; tests and
/// the demo binary use [`MockCollaborator`].
pub trait QuerySource: Send + Sync {
    /// Every host name matching the node scope/selector.
    fn hosts(&self) -> Vec<String>;

    /// Every `(context, instance, metric)` triple for `host` matching the
    /// context/instance/dimension selectors. Returning metric refs eagerly
    /// (rather than a callback) keeps the mock trivial; a production
    /// implementation backed by a real catalog would use `foreach_*`
    /// callbacks instead to avoid materializing the whole catalog, but nothing
    /// here depends on which shape is chosen.
    fn metrics(&self, host: &str) -> Vec<MetricRef>;

    /// Equal-stride aligned sampling over `[after, before)`.
    fn query_series(
        &self,
        host: &str,
        metric: &MetricRef,
        after: i64,
        before: i64,
        points: u32,
        tier: u8,
    ) -> Series;

    /// A single aggregate value over `[after, before)`, grouped by
    /// `time_group`.
    fn query_value(
        &self,
        host: &str,
        metric: &MetricRef,
        after: i64,
        before: i64,
        time_group: TimeGrouping,
        anomaly_bit: bool,
        tier: u8,
    ) -> QueryValue;

    /// `COUNTIF` aggregation: the fraction of samples in `[after, before)`
    /// satisfying `comparison` against `threshold`, expressed as a
    /// **percentage** in `[0, 100]` (confirmed against the original
    /// `rrdset_metric_correlations_volume` call site).
    fn query_countif(
        &self,
        host: &str,
        metric: &MetricRef,
        after: i64,
        before: i64,
        comparison: Comparison,
        threshold: f64,
        tier: u8,
    ) -> QueryValue;

    /// Batched form of [`QuerySource::query_value`] used by C4's
    /// multi-dimensional fast path (spec §4.4): one call returns a value
    /// per `metrics` entry in the same order. The default implementation
    /// just loops, which is what [`mock::MockCollaborator`] does; a real
    /// storage-engine implementation would override this to issue one
    /// query that groups by dimension instead of `metrics.len()` separate
    /// round trips.
    fn query_value_batch(
        &self,
        host: &str,
        metrics: &[MetricRef],
        after: i64,
        before: i64,
        time_group: TimeGrouping,
        anomaly_bit: bool,
        tier: u8,
    ) -> Vec<QueryValue> {
        metrics
            .iter()
            .map(|m| self.query_value(host, m, after, before, time_group, anomaly_bit, tier))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    LessThan,
}

/// Not test-only: `weights-cli` uses this directly to drive the coordinator
/// without a real storage engine behind it (spec A, "a small clap-based
/// binary that builds a synthetic multi-host dataset with the mock
/// collaborator").
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    /// In-memory [`QuerySource`], driven by literal per-host, per-metric
    /// series supplied at construction time.
    pub struct MockCollaborator {
        hosts: Vec<String>,
        series: HashMap<(String, String, String, String), Vec<(i64, f64)>>,
    }

    impl MockCollaborator {
        pub fn new() -> Self {
            MockCollaborator { hosts: Vec::new(), series: HashMap::new() }
        }

        /// Registers `points` (timestamp, value pairs, ascending) for one
        /// metric on one host.
        pub fn with_metric(
            mut self,
            host: &str,
            context: &str,
            instance: &str,
            metric: &str,
            points: Vec<(i64, f64)>,
        ) -> Self {
            if !self.hosts.iter().any(|h| h == host) {
                self.hosts.push(host.to_string());
            }
            self.series.insert(
                (host.to_string(), context.to_string(), instance.to_string(), metric.to_string()),
                points,
            );
            self
        }

        fn slice(&self, host: &str, metric: &MetricRef, after: i64, before: i64) -> Vec<f64> {
            self.series
                .get(&(host.to_string(), metric.context.clone(), metric.instance.clone(), metric.metric.clone()))
                .map(|pts| {
                    pts.iter()
                        .filter(|(t, _)| *t >= after && *t < before)
                        .map(|(_, v)| *v)
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    impl Default for MockCollaborator {
        fn default() -> Self {
            Self::new()
        }
    }

    impl QuerySource for MockCollaborator {
        fn hosts(&self) -> Vec<String> {
            self.hosts.clone()
        }

        fn metrics(&self, host: &str) -> Vec<MetricRef> {
            self.series
                .keys()
                .filter(|(h, _, _, _)| h == host)
                .map(|(h, c, i, m)| MetricRef {
                    host: h.clone(),
                    context: c.clone(),
                    instance: i.clone(),
                    metric: m.clone(),
                })
                .collect()
        }

        fn query_series(
            &self,
            host: &str,
            metric: &MetricRef,
            after: i64,
            before: i64,
            _points: u32,
            _tier: u8,
        ) -> Series {
            let values = self.slice(host, metric, after, before);
            let sp = summarize(&values);
            let points = values.len() as u64;
            Series { db_points: points, result_points: points, values, storage_point: sp }
        }

        fn query_value(
            &self,
            host: &str,
            metric: &MetricRef,
            after: i64,
            before: i64,
            _time_group: TimeGrouping,
            _anomaly_bit: bool,
            _tier: u8,
        ) -> QueryValue {
            let values = self.slice(host, metric, after, before);
            let sp = summarize(&values);
            let value = if values.is_empty() {
                f64::NAN
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            QueryValue {
                value,
                anomaly_rate: 0.0,
                storage_point: sp,
                db_points: values.len() as u64,
                result_points: if values.is_empty() { 0 } else { 1 },
                duration_us: 0,
            }
        }

        fn query_countif(
            &self,
            host: &str,
            metric: &MetricRef,
            after: i64,
            before: i64,
            comparison: Comparison,
            threshold: f64,
            _tier: u8,
        ) -> QueryValue {
            let values = self.slice(host, metric, after, before);
            if values.is_empty() {
                return QueryValue { value: f64::NAN, ..Default::default() };
            }
            let matching = values
                .iter()
                .filter(|v| match comparison {
                    Comparison::GreaterThan => **v > threshold,
                    Comparison::LessThan => **v < threshold,
                })
                .count();
            let pct = matching as f64 / values.len() as f64 * 100.0;
            QueryValue {
                value: pct,
                anomaly_rate: 0.0,
                storage_point: summarize(&values),
                db_points: values.len() as u64,
                result_points: 1,
                duration_us: 0,
            }
        }
    }

    fn summarize(values: &[f64]) -> StoragePoint {
        if values.is_empty() {
            return StoragePoint::default();
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = values.iter().sum();
        StoragePoint { min, max, sum, count: values.len() as u64, anomaly_count: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockCollaborator;
    use super::*;

    #[test]
    fn mock_collects_hosts_and_slices_by_window() {
        let mock = MockCollaborator::new().with_metric(
            "h1",
            "system.cpu",
            "cpu",
            "user",
            vec![(0, 1.0), (10, 2.0), (20, 3.0)],
        );
        assert_eq!(mock.hosts(), vec!["h1".to_string()]);
        let metric = &mock.metrics("h1")[0];
        let series = mock.query_series("h1", metric, 0, 15, 100, 0);
        assert_eq!(series.values, vec![1.0, 2.0]);
    }
}
