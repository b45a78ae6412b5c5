//! C6 — the query planner & coordinator (spec §4.6).
//!
//! Validates and clamps the request window, enumerates hosts, fans out to a
//! fixed-size pool of worker threads (one thread-local [`Registry`] each),
//! and merges their partial results under a global deadline and an optional
//! caller-supplied interrupt predicate. Grounded on the teacher's
//! `StorageManager`'s single-owner-per-request lifecycle
//! (`storage/manager.rs`'s `RotationConfig`) for threading configuration by
//! value rather than through global state, and on plain `std::thread`
//! fan-out since no worker-pool crate appears anywhere in the retrieval
//! pack.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::WeightsError;
use crate::identity::MetricIdentity;
use crate::query::{MetricRef, QuerySource};
use crate::registry::{Registry, Stats};
use crate::request::{EngineConfig, Options, WeightsMethod, WeightsRequest};
use crate::scorer;
use crate::window::{Alignment, Window, align_baseline};

/// Where a request landed in the state machine of spec §4.8. Only
/// `Validated -> Fanned-out` can fail outright (surfaced as `Err`); these
/// three are the terminal states fan-out can reach, all of which still get
/// ranked and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    TimedOut,
    Interrupted,
}

impl RunStatus {
    /// HTTP-style status for this outcome (spec §6.3, §7): `200`/`408`/`499`.
    pub fn as_http_status(&self) -> u16 {
        match self {
            RunStatus::Completed => 200,
            RunStatus::TimedOut => 408,
            RunStatus::Interrupted => 499,
        }
    }
}

/// Everything C7 needs to rank and render: the merged registry and stats,
/// the terminal run status, and the window/alignment actually used (after
/// clamping).
pub struct CoordinatorOutcome {
    pub registry: Registry,
    pub stats: Stats,
    pub status: RunStatus,
    pub examined_dimensions: u64,
    pub window: Window,
    pub alignment: Option<Alignment>,
    pub query_time_ms: u64,
}

/// Runs one weights request to completion (or until the deadline/interrupt
/// fires), against `source`.
pub fn run(
    request: &WeightsRequest,
    config: &EngineConfig,
    source: &dyn QuerySource,
) -> Result<CoordinatorOutcome, WeightsError> {
    let started = Instant::now();

    let mut request = request.clone();
    request.clamp_defaults();

    let window = Window::new(request.after, request.before, request.points, request.tier)
        .map_err(|e| WeightsError::InvalidRange(e.0))?;

    let alignment = if request.method.requires_baseline() {
        Some(
            align_baseline(
                window.after,
                window.before,
                request.baseline_after,
                request.baseline_before,
                window.points,
            )
            .map_err(|e| WeightsError::InvalidRange(e.0))?,
        )
    } else {
        None
    };
    let points = alignment.map(|a| a.points).unwrap_or(window.points);

    let hosts: Vec<String> = source.hosts().into_iter().filter(|h| request.nodes.is_match(h)).collect();

    let mut outcome = CoordinatorOutcome {
        registry: Registry::new(),
        stats: Stats::default(),
        status: RunStatus::Completed,
        examined_dimensions: 0,
        window,
        alignment,
        query_time_ms: 0,
    };

    if hosts.is_empty() || !config.enabled {
        outcome.query_time_ms = started.elapsed().as_millis() as u64;
        return Ok(outcome);
    }

    let deadline = Instant::now() + Duration::from_millis(request.timeout_ms as u64);
    let timed_out = AtomicBool::new(false);
    let interrupted = AtomicBool::new(false);

    let worker_count = config
        .worker_count_override
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
        .min(hosts.len())
        .max(1);

    let partials: Vec<(Registry, Stats, u64)> = if worker_count <= 1 || hosts.len() <= 1 {
        vec![run_host_slice(&hosts, &request, points, alignment, source, deadline, &timed_out, &interrupted)]
    } else {
        let slices = partition(&hosts, worker_count);
        std::thread::scope(|scope| {
            let handles: Vec<_> = slices
                .iter()
                .map(|slice| {
                    scope.spawn(|| {
                        run_host_slice(slice, &request, points, alignment, source, deadline, &timed_out, &interrupted)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("worker thread panicked")).collect()
        })
    };

    for (local_registry, local_stats, local_examined) in partials {
        outcome.registry.merge(local_registry);
        outcome.stats.merge(&local_stats);
        outcome.examined_dimensions += local_examined;
    }

    outcome.status = if interrupted.load(Ordering::Relaxed) {
        warn!("weights request interrupted before fan-out completed");
        RunStatus::Interrupted
    } else if timed_out.load(Ordering::Relaxed) {
        warn!(timeout_ms = request.timeout_ms, "weights request timed out before fan-out completed");
        RunStatus::TimedOut
    } else {
        RunStatus::Completed
    };

    outcome.query_time_ms = started.elapsed().as_millis() as u64;

    info!(
        examined_dimensions = outcome.examined_dimensions,
        registered = outcome.registry.len(),
        elapsed_ms = outcome.query_time_ms,
        status = ?outcome.status,
        "weights request fan-out complete"
    );

    Ok(outcome)
}

/// Splits `hosts` into up to `n` contiguous, roughly-equal slices.
fn partition(hosts: &[String], n: usize) -> Vec<&[String]> {
    let n = n.max(1).min(hosts.len().max(1));
    let chunk = hosts.len().div_ceil(n);
    if chunk == 0 {
        return vec![hosts];
    }
    hosts.chunks(chunk).collect()
}

#[allow(clippy::too_many_arguments)]
fn run_host_slice(
    hosts: &[String],
    request: &WeightsRequest,
    points: u32,
    alignment: Option<Alignment>,
    source: &dyn QuerySource,
    deadline: Instant,
    timed_out: &AtomicBool,
    interrupted: &AtomicBool,
) -> (Registry, Stats, u64) {
    debug!(hosts = ?hosts, "dispatched host slice to worker");

    let mut registry = Registry::new();
    let mut stats = Stats::default();
    let mut examined = 0u64;
    let register_zero = !request.options.contains(Options::NONZERO);

    'hosts: for host in hosts {
        let metrics: Vec<MetricRef> = source
            .metrics(host)
            .into_iter()
            .filter(|m| request.contexts.is_match(&m.context))
            .filter(|m| request.instances.is_match(&m.instance))
            .filter(|m| request.dimensions.is_match(&m.metric))
            .collect();

        let use_batch = matches!(request.method, WeightsMethod::Value | WeightsMethod::AnomalyRate)
            && request.contexts.single_literal().is_some();

        if use_batch {
            let mut by_context: HashMap<&str, Vec<MetricRef>> = HashMap::new();
            for m in &metrics {
                by_context.entry(m.context.as_str()).or_default().push(m.clone());
            }
            for (_, context_metrics) in by_context {
                if check_deadline_and_interrupt(deadline, request, timed_out, interrupted) {
                    break 'hosts;
                }
                examined += context_metrics.len() as u64;
                let anomaly_bit = request.method == WeightsMethod::AnomalyRate
                    || request.options.contains(Options::ANOMALY_BIT);
                let started = Instant::now();
                let scored = scorer::value::score_batch(
                    source,
                    host,
                    &context_metrics,
                    request.after,
                    request.before,
                    request.time_group,
                    anomaly_bit,
                    request.tier,
                );
                let duration_us = started.elapsed().as_micros() as u64;
                for (metric, outcome) in scored {
                    if let Some(outcome) = outcome {
                        let identity = MetricIdentity::new(host.as_str(), &metric.context, &metric.instance, &metric.metric);
                        stats.db_queries += outcome.db_queries;
                        stats.db_points += outcome.db_points;
                        stats.result_points += outcome.result_points;
                        stats.add_tier_points(request.tier, outcome.db_points);
                        registry.insert(
                            identity,
                            outcome.value,
                            outcome.flags,
                            outcome.highlighted,
                            outcome.baseline,
                            &mut stats,
                            register_zero,
                            duration_us,
                        );
                    }
                }
            }
            continue 'hosts;
        }

        for metric in &metrics {
            if check_deadline_and_interrupt(deadline, request, timed_out, interrupted) {
                break 'hosts;
            }
            examined += 1;

            let started = Instant::now();
            let outcome = match request.method {
                WeightsMethod::Ks2 => scorer::ks2::score(
                    source,
                    host,
                    metric,
                    request.after,
                    request.before,
                    alignment.as_ref().expect("ks2 requires alignment"),
                    request.tier,
                ),
                WeightsMethod::Volume => {
                    let a = alignment.expect("volume requires alignment");
                    scorer::volume::score(
                        source,
                        host,
                        metric,
                        request.after,
                        request.before,
                        a.baseline_after,
                        a.baseline_before,
                        request.time_group,
                        request.options.contains(Options::ANOMALY_BIT),
                        request.tier,
                    )
                }
                WeightsMethod::Value => scorer::value::score(
                    source,
                    host,
                    metric,
                    request.after,
                    request.before,
                    request.time_group,
                    request.options.contains(Options::ANOMALY_BIT),
                    request.tier,
                ),
                WeightsMethod::AnomalyRate => scorer::value::score(
                    source,
                    host,
                    metric,
                    request.after,
                    request.before,
                    request.time_group,
                    true,
                    request.tier,
                ),
            };
            let duration_us = started.elapsed().as_micros() as u64;

            if let Some(outcome) = outcome {
                let identity = MetricIdentity::new(host.as_str(), &metric.context, &metric.instance, &metric.metric);
                stats.db_queries += outcome.db_queries;
                stats.db_points += outcome.db_points;
                stats.result_points += outcome.result_points;
                stats.binary_searches += outcome.binary_searches;
                stats.add_tier_points(request.tier, outcome.db_points);
                registry.insert(
                    identity,
                    outcome.value,
                    outcome.flags,
                    outcome.highlighted,
                    outcome.baseline,
                    &mut stats,
                    register_zero,
                    duration_us,
                );
            }
        }
    }

    // Unused when `points` isn't needed by a particular method; kept as a
    // parameter so callers don't have to special-case non-KS2 methods.
    let _ = points;

    (registry, stats, examined)
}

/// Checks the shared deadline/interrupt state at a metric boundary,
/// latching the relevant atomic if either condition fires (spec §5
/// "Deadline & interrupt"). Returns `true` if the caller should stop.
fn check_deadline_and_interrupt(
    deadline: Instant,
    request: &WeightsRequest,
    timed_out: &AtomicBool,
    interrupted: &AtomicBool,
) -> bool {
    if interrupted.load(Ordering::Relaxed) || timed_out.load(Ordering::Relaxed) {
        return true;
    }
    if Instant::now() > deadline {
        timed_out.store(true, Ordering::Relaxed);
        return true;
    }
    if let Some(cb) = &request.interrupt_callback {
        if cb() {
            interrupted.store(true, Ordering::Relaxed);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mock::MockCollaborator;
    use crate::request::{Selector, WeightsMethod};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn mock_fleet() -> MockCollaborator {
        let mut mock = MockCollaborator::new();
        for h in ["h1", "h2", "h3"] {
            let baseline: Vec<(i64, f64)> = (0..40).map(|i| (i * 10, 1.0)).collect();
            let highlight: Vec<(i64, f64)> = (0..20).map(|i| (400 + i * 10, 50.0)).collect();
            let mut all = baseline;
            all.extend(highlight);
            mock = mock.with_metric(h, "system.cpu", "cpu", "user", all);
        }
        mock
    }

    #[test]
    fn rejects_invalid_window() {
        let mock = mock_fleet();
        let req = WeightsRequest { after: 100, before: 50, ..Default::default() };
        let config = EngineConfig::default();
        assert!(run(&req, &config, &mock).is_err());
    }

    #[test]
    fn ks2_run_registers_and_merges_across_hosts() {
        let mock = mock_fleet();
        let req = WeightsRequest {
            method: WeightsMethod::Ks2,
            after: 400,
            before: 600,
            baseline_after: 0,
            baseline_before: 400,
            points: 20,
            ..Default::default()
        };
        let config = EngineConfig::default();
        let outcome = run(&req, &config, &mock).expect("should run");
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.registry.len(), 3);
        assert_eq!(outcome.examined_dimensions, 3);
        for r in outcome.registry.values() {
            assert!((0.0..=1.0).contains(&r.value));
        }
    }

    #[test]
    fn stats_carry_result_points_and_per_tier_db_points() {
        let mock = mock_fleet();
        let req = WeightsRequest {
            method: WeightsMethod::Ks2,
            after: 400,
            before: 600,
            baseline_after: 0,
            baseline_before: 400,
            points: 20,
            tier: 1,
            ..Default::default()
        };
        let config = EngineConfig::default();
        let outcome = run(&req, &config, &mock).expect("should run");
        assert!(outcome.stats.result_points > 0);
        assert_eq!(outcome.stats.db_points_per_tier[1], outcome.stats.db_points);
        assert_eq!(outcome.stats.db_points_per_tier[0], 0);
    }

    #[test]
    fn node_selector_filters_hosts() {
        let mock = mock_fleet();
        let req = WeightsRequest {
            method: WeightsMethod::Ks2,
            after: 400,
            before: 600,
            baseline_after: 0,
            baseline_before: 400,
            points: 20,
            nodes: Selector { scope: vec![], include: vec!["h1".into()] },
            ..Default::default()
        };
        let config = EngineConfig::default();
        let outcome = run(&req, &config, &mock).expect("should run");
        assert_eq!(outcome.registry.len(), 1);
    }

    #[test]
    fn interrupt_callback_stops_fan_out_cooperatively() {
        let mock = mock_fleet();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_cb = Arc::clone(&calls);
        let req = WeightsRequest {
            method: WeightsMethod::Ks2,
            after: 400,
            before: 600,
            baseline_after: 0,
            baseline_before: 400,
            points: 20,
            interrupt_callback: Some(Arc::new(move || {
                calls_for_cb.fetch_add(1, Ordering::Relaxed);
                true
            })),
            ..Default::default()
        };
        let config = EngineConfig { worker_count_override: Some(1), ..Default::default() };
        let outcome = run(&req, &config, &mock).expect("should run");
        assert_eq!(outcome.status, RunStatus::Interrupted);
        assert!(calls.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn no_matching_hosts_completes_with_an_empty_registry() {
        let mock = mock_fleet();
        let req = WeightsRequest {
            method: WeightsMethod::Ks2,
            after: 400,
            before: 600,
            baseline_after: 0,
            baseline_before: 400,
            points: 20,
            nodes: Selector { scope: vec![], include: vec!["nonexistent".into()] },
            ..Default::default()
        };
        let config = EngineConfig::default();
        let outcome = run(&req, &config, &mock).expect("should run");
        assert_eq!(outcome.status, RunStatus::Completed);
        assert!(outcome.registry.is_empty());
    }
}
