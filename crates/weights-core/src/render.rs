//! C7, part 2 — response rendering (spec §6.2).
//!
//! Builds the JSON response: a shared envelope (window/baseline echo,
//! statistics, group/method/options echoes, dimension counts) plus one of
//! four shape-specific bodies. Grounded on the teacher's `serde_json::json!`
//! usage in `rpglot-web` (`auth.rs`'s forbidden-response body) — the only
//! JSON-construction idiom anywhere in the pack's five teacher candidates —
//! since the four shapes nest too differently from one another for one
//! fixed `#[derive(Serialize)]` struct to express cleanly.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use crate::coordinator::CoordinatorOutcome;
use crate::rank::RankedResult;
use crate::request::{Aggregation, GroupBy, Options, OutputFormat, WeightsRequest};

/// Renders the full response for `request`, given the coordinator's outcome
/// and the rank-normalized results. Results are sorted descending by score
/// before any shape-specific work, matching "sorts top-N" in spec §4.7.
pub fn render(request: &WeightsRequest, outcome: &CoordinatorOutcome, ranked: &[RankedResult]) -> Value {
    let mut sorted: Vec<&RankedResult> = ranked.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.identity.to_string().cmp(&b.identity.to_string()))
    });

    let body = match request.format {
        OutputFormat::Charts => charts_body(&sorted),
        OutputFormat::Contexts => contexts_body(&sorted),
        OutputFormat::Multinode => multinode_body(request, &sorted),
        OutputFormat::Mcp => mcp_body(request, &sorted),
    };

    let mut envelope = envelope(request, outcome, sorted.len() as u64);
    let Value::Object(ref mut map) = envelope else { unreachable!() };
    if let Value::Object(body_map) = body {
        map.extend(body_map);
    }
    envelope
}

/// Formats an epoch-second timestamp per spec §6.1's `RFC3339` option
/// (`buffer_json_member_add_time_t_formatted` in the original: epoch seconds
/// by default, an RFC 3339 UTC string when the option is set).
fn time_value(ts: i64, rfc3339: bool) -> Value {
    if rfc3339 {
        match Utc.timestamp_opt(ts, 0).single() {
            Some(dt) => json!(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            None => json!(ts),
        }
    } else {
        json!(ts)
    }
}

fn envelope(request: &WeightsRequest, outcome: &CoordinatorOutcome, correlated_dimensions: u64) -> Value {
    let window = &outcome.window;
    let rfc3339 = request.options.contains(Options::RFC3339);
    let mut envelope = json!({
        "after": time_value(window.after, rfc3339),
        "before": time_value(window.before, rfc3339),
        "duration": window.duration(),
        "points": window.points,
        "method": request.method,
        "group": group_by_names(request.group_by),
        "options": options_names(request.options),
        "status": outcome.status.as_http_status(),
        "correlated_dimensions": correlated_dimensions,
        "total_dimensions_count": outcome.examined_dimensions,
        "statistics": {
            "query_time_ms": outcome.query_time_ms,
            "db_queries": outcome.stats.db_queries,
            "query_result_points": outcome.stats.result_points,
            "binary_searches": outcome.stats.binary_searches,
            "db_points_read": outcome.stats.db_points,
            "db_points_per_tier": outcome.stats.db_points_per_tier.to_vec(),
        },
    });

    if let Some(alignment) = &outcome.alignment {
        envelope["baseline"] = json!({
            "after": time_value(alignment.baseline_after, rfc3339),
            "before": time_value(alignment.baseline_before, rfc3339),
            "duration": alignment.baseline_before - alignment.baseline_after,
            "points": alignment.points,
        });
    }

    envelope
}

fn group_by_names(group_by: GroupBy) -> Vec<&'static str> {
    let mut names = Vec::new();
    if group_by.contains(GroupBy::DIMENSION) {
        names.push("dimension");
    }
    if group_by.contains(GroupBy::INSTANCE) {
        names.push("instance");
    }
    if group_by.contains(GroupBy::NODE) {
        names.push("node");
    }
    if group_by.contains(GroupBy::CONTEXT) {
        names.push("context");
    }
    if group_by.contains(GroupBy::UNITS) {
        names.push("units");
    }
    names
}

fn options_names(options: crate::request::Options) -> Vec<&'static str> {
    use crate::request::Options;
    let mut names = Vec::new();
    if options.contains(Options::ANOMALY_BIT) {
        names.push("anomaly-bit");
    }
    if options.contains(Options::NONZERO) {
        names.push("nonzero");
    }
    if options.contains(Options::NATURAL_POINTS) {
        names.push("natural-points");
    }
    if options.contains(Options::MATCH_IDS) {
        names.push("match-ids");
    }
    if options.contains(Options::MINIFY) {
        names.push("minify");
    }
    if options.contains(Options::RAW) {
        names.push("raw");
    }
    if options.contains(Options::RFC3339) {
        names.push("rfc3339");
    }
    names
}

/// Builds the key used to bucket a ranked result under `group_by`.
///
/// Preserves an asymmetry from the original (spec §9 open question,
/// SPEC_FULL.md F.5): when both `DIMENSION` and `INSTANCE` are set but
/// `NODE` is not, the key is disambiguated with the host anyway, because a
/// dimension name repeats across instances/hosts. The inverse combination —
/// `NODE` set without `DIMENSION`+`INSTANCE` — receives no equivalent
/// treatment, even though the same ambiguity can arise there. This is kept
/// as-is rather than corrected.
pub fn group_by_key(group_by: GroupBy, r: &RankedResult) -> String {
    let mut parts = Vec::new();
    if group_by.contains(GroupBy::CONTEXT) {
        parts.push(r.identity.context.clone());
    }
    if group_by.contains(GroupBy::INSTANCE) {
        parts.push(r.identity.instance.clone());
    }
    if group_by.contains(GroupBy::DIMENSION) {
        parts.push(r.identity.metric.clone());
    }
    if group_by.contains(GroupBy::NODE) {
        parts.push(r.identity.host.clone());
    } else if group_by.contains(GroupBy::DIMENSION) && group_by.contains(GroupBy::INSTANCE) {
        parts.push(r.identity.host.clone());
    }
    if parts.is_empty() { r.identity.to_string() } else { parts.join("|") }
}

fn storage_point_json(sp: &crate::query::StoragePoint) -> Value {
    json!({ "min": sp.min, "max": sp.max, "sum": sp.sum, "count": sp.count, "anomaly_count": sp.anomaly_count })
}

/// `{context → {charts → {chart → {dimensions → {dimension → score}}}}}`.
fn charts_body(ranked: &[&RankedResult]) -> Value {
    let mut contexts: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>> = BTreeMap::new();
    for r in ranked {
        contexts
            .entry(r.identity.context.clone())
            .or_default()
            .entry(r.identity.instance.clone())
            .or_default()
            .insert(r.identity.metric.clone(), r.score);
    }
    let contexts: BTreeMap<String, Value> = contexts
        .into_iter()
        .map(|(context, charts)| {
            let charts: BTreeMap<String, Value> =
                charts.into_iter().map(|(chart, dims)| (chart, json!({ "dimensions": dims }))).collect();
            (context, json!({ "charts": charts }))
        })
        .collect();
    json!({ "contexts": contexts })
}

/// `{chart → {context, dimensions → {dimension → score}}}`.
fn contexts_body(ranked: &[&RankedResult]) -> Value {
    let mut charts: BTreeMap<String, (String, BTreeMap<String, f64>)> = BTreeMap::new();
    for r in ranked {
        let entry = charts
            .entry(r.identity.instance.clone())
            .or_insert_with(|| (r.identity.context.clone(), BTreeMap::new()));
        entry.1.insert(r.identity.metric.clone(), r.score);
    }
    let charts: BTreeMap<String, Value> = charts
        .into_iter()
        .map(|(chart, (context, dims))| (chart, json!({ "context": context, "dimensions": dims })))
        .collect();
    json!({ "charts": charts })
}

/// Columnar `result` array plus `schema` and the `nodes`/`contexts`/
/// `instances`/`dimensions` dictionaries (spec §6.2). With `request.group_by`
/// set, rows sharing a group key are bucketed and their weights aggregated
/// per `request.aggregation` instead of emitted one-per-result.
fn multinode_body(request: &WeightsRequest, ranked: &[&RankedResult]) -> Value {
    if request.group_by.is_empty() {
        return multinode_body_ungrouped(ranked);
    }
    multinode_body_grouped(request, ranked)
}

fn multinode_body_ungrouped(ranked: &[&RankedResult]) -> Value {
    let mut nodes = Vec::new();
    let mut contexts = Vec::new();
    let mut instances = Vec::new();
    let mut dimensions = Vec::new();

    let mut rows = Vec::with_capacity(ranked.len());
    for r in ranked {
        let ni = dictionary_index(&mut nodes, &r.identity.host);
        let ci = dictionary_index(&mut contexts, &r.identity.context);
        let ii = dictionary_index(&mut instances, &r.identity.instance);
        let di = dictionary_index(&mut dimensions, &r.identity.metric);
        let mut row = vec![
            json!("result"),
            json!(ni),
            json!(ci),
            json!(ii),
            json!(di),
            json!(r.score),
            storage_point_json(&r.highlighted),
        ];
        if let Some(baseline) = &r.baseline {
            row.push(storage_point_json(baseline));
        }
        rows.push(Value::Array(row));
    }

    json!({
        "schema": ["row_type", "ni", "ci", "ii", "di", "weight", "timeframe_stats", "baseline_stats"],
        "result": rows,
        "nodes": nodes,
        "contexts": contexts,
        "instances": instances,
        "dimensions": dimensions,
    })
}

/// Groups `ranked` by [`group_by_key`] and emits one row per group, with
/// `weight` the `request.aggregation` combination of the group's member
/// scores and `timeframe_stats`/`baseline_stats` the member storage points
/// merged together. A dictionary index is only emitted for a field when
/// every member of the group shares the same value for it — fields that
/// vary within a group (because they aren't part of the group key) are
/// rendered as `null`.
fn multinode_body_grouped(request: &WeightsRequest, ranked: &[&RankedResult]) -> Value {
    let mut nodes = Vec::new();
    let mut contexts = Vec::new();
    let mut instances = Vec::new();
    let mut dimensions = Vec::new();

    let mut groups: BTreeMap<String, Vec<&RankedResult>> = BTreeMap::new();
    for r in ranked {
        groups.entry(group_by_key(request.group_by, *r)).or_default().push(*r);
    }

    let mut rows = Vec::with_capacity(groups.len());
    for members in groups.values() {
        let scores: Vec<f64> = members.iter().map(|m| m.score).collect();
        let weight = aggregate_score(&scores, request.aggregation);

        let ni = uniform_field(members, |m| m.identity.host.as_str()).map(|v| dictionary_index(&mut nodes, v));
        let ci =
            uniform_field(members, |m| m.identity.context.as_str()).map(|v| dictionary_index(&mut contexts, v));
        let ii =
            uniform_field(members, |m| m.identity.instance.as_str()).map(|v| dictionary_index(&mut instances, v));
        let di =
            uniform_field(members, |m| m.identity.metric.as_str()).map(|v| dictionary_index(&mut dimensions, v));

        let mut row = vec![
            json!("result"),
            opt_index(ni),
            opt_index(ci),
            opt_index(ii),
            opt_index(di),
            json!(weight),
            storage_point_json(&merge_storage_points(members.iter().map(|m| m.highlighted))),
        ];
        if members.iter().all(|m| m.baseline.is_some()) {
            row.push(storage_point_json(&merge_storage_points(members.iter().filter_map(|m| m.baseline))));
        }
        rows.push(Value::Array(row));
    }

    json!({
        "schema": ["row_type", "ni", "ci", "ii", "di", "weight", "timeframe_stats", "baseline_stats"],
        "result": rows,
        "nodes": nodes,
        "contexts": contexts,
        "instances": instances,
        "dimensions": dimensions,
    })
}

/// Combines per-member scores into one group weight, per `request.aggregation`
/// (spec §6.1). `ArithMean` is the same formula as `Avg` here — the
/// distinction in the original concerns incremental recalculation across
/// overlapping windows, which this engine does not do.
fn aggregate_score(scores: &[f64], aggregation: Aggregation) -> f64 {
    match aggregation {
        Aggregation::Sum => scores.iter().sum(),
        Aggregation::Min => scores.iter().cloned().fold(f64::INFINITY, f64::min),
        Aggregation::Max => scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Avg | Aggregation::ArithMean => scores.iter().sum::<f64>() / scores.len() as f64,
    }
}

/// Returns `f(members[0])` if every member agrees on it, else `None`.
fn uniform_field<'a>(members: &[&'a RankedResult], f: impl Fn(&'a RankedResult) -> &'a str) -> Option<&'a str> {
    let first = f(members[0]);
    if members.iter().all(|&m| f(m) == first) { Some(first) } else { None }
}

fn merge_storage_points(points: impl Iterator<Item = crate::query::StoragePoint>) -> crate::query::StoragePoint {
    let merged = points.fold(None, |acc: Option<crate::query::StoragePoint>, p| {
        if p.is_unset() {
            return acc;
        }
        Some(match acc {
            None => p,
            Some(mut sp) => {
                sp.min = sp.min.min(p.min);
                sp.max = sp.max.max(p.max);
                sp.sum += p.sum;
                sp.count += p.count;
                sp.anomaly_count += p.anomaly_count;
                sp
            }
        })
    });
    merged.unwrap_or_default()
}

fn opt_index(i: Option<usize>) -> Value {
    match i {
        Some(i) => json!(i),
        None => Value::Null,
    }
}

fn dictionary_index(dict: &mut Vec<String>, value: &str) -> usize {
    if let Some(i) = dict.iter().position(|v| v == value) {
        i
    } else {
        dict.push(value.to_string());
        dict.len() - 1
    }
}

/// `columns` + `results`, cardinality-limited with `metadata.truncated`
/// (spec §4.7, §6.2).
fn mcp_body(request: &WeightsRequest, ranked: &[&RankedResult]) -> Value {
    let limit = request.cardinality_limit as usize;
    let truncated = ranked.len() > limit;
    let limited = &ranked[..ranked.len().min(limit)];

    let results: Vec<Value> = limited
        .iter()
        .map(|r| json!([r.identity.host, r.identity.context, r.identity.instance, r.identity.metric, r.score]))
        .collect();

    json!({
        "columns": ["node", "context", "instance", "dimension", "score"],
        "results": results,
        "metadata": { "truncated": truncated, "cardinality_limit": request.cardinality_limit },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::RunStatus;
    use crate::identity::MetricIdentity;
    use crate::query::StoragePoint;
    use crate::registry::ResultFlags;
    use crate::request::{Options, WeightsMethod};
    use crate::window::Window;

    fn outcome() -> CoordinatorOutcome {
        CoordinatorOutcome {
            registry: crate::registry::Registry::new(),
            stats: crate::registry::Stats::default(),
            status: RunStatus::Completed,
            examined_dimensions: 2,
            window: Window::new(0, 100, 20, 0).unwrap(),
            alignment: None,
            query_time_ms: 0,
        }
    }

    fn result(host: &str, context: &str, instance: &str, metric: &str, score: f64) -> RankedResult {
        RankedResult {
            identity: MetricIdentity::new(host, context, instance, metric),
            score,
            flags: ResultFlags::empty(),
            highlighted: StoragePoint::default(),
            baseline: None,
            duration_us: 0,
        }
    }

    #[test]
    fn charts_shape_nests_context_chart_dimension() {
        let request = WeightsRequest { format: OutputFormat::Charts, ..Default::default() };
        let ranked = vec![result("h1", "system.cpu", "cpu", "user", 0.5)];
        let rendered = render(&request, &outcome(), &ranked);
        assert_eq!(
            rendered["contexts"]["system.cpu"]["charts"]["cpu"]["dimensions"]["user"],
            json!(0.5)
        );
    }

    #[test]
    fn contexts_shape_nests_chart_with_inline_context() {
        let request = WeightsRequest { format: OutputFormat::Contexts, ..Default::default() };
        let ranked = vec![result("h1", "system.cpu", "cpu", "user", 0.5)];
        let rendered = render(&request, &outcome(), &ranked);
        assert_eq!(rendered["charts"]["cpu"]["context"], json!("system.cpu"));
        assert_eq!(rendered["charts"]["cpu"]["dimensions"]["user"], json!(0.5));
    }

    #[test]
    fn multinode_shape_deduplicates_dictionary_entries() {
        let request = WeightsRequest { format: OutputFormat::Multinode, ..Default::default() };
        let ranked = vec![
            result("h1", "system.cpu", "cpu", "user", 0.9),
            result("h1", "system.cpu", "cpu", "system", 0.5),
        ];
        let rendered = render(&request, &outcome(), &ranked);
        assert_eq!(rendered["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(rendered["contexts"].as_array().unwrap().len(), 1);
        assert_eq!(rendered["result"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn multinode_group_by_buckets_rows_sharing_a_key() {
        let request = WeightsRequest {
            format: OutputFormat::Multinode,
            group_by: GroupBy::INSTANCE,
            aggregation: Aggregation::Sum,
            ..Default::default()
        };
        let ranked = vec![
            result("h1", "system.cpu", "cpu", "user", 0.4),
            result("h1", "system.cpu", "cpu", "system", 0.6),
            result("h1", "system.mem", "mem", "used", 0.1),
        ];
        let rendered = render(&request, &outcome(), &ranked);
        let rows = rendered["result"].as_array().unwrap();
        assert_eq!(rows.len(), 2, "two distinct instances, one row each");

        let cpu_row = rows.iter().find(|r| (r[5].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert!(cpu_row.is_some(), "cpu+system weights summed to 1.0");
    }

    #[test]
    fn multinode_group_by_aggregation_selects_the_combinator() {
        let ranked = vec![result("h1", "system.cpu", "cpu", "user", 0.2), result("h1", "system.cpu", "cpu", "sys", 0.8)];

        let avg_req = WeightsRequest {
            format: OutputFormat::Multinode,
            group_by: GroupBy::INSTANCE,
            aggregation: Aggregation::Avg,
            ..Default::default()
        };
        let avg_rendered = render(&avg_req, &outcome(), &ranked);
        let avg_rows = avg_rendered["result"].as_array().unwrap();
        assert_eq!(avg_rows.len(), 1);
        assert!((avg_rows[0][5].as_f64().unwrap() - 0.5).abs() < 1e-9);

        let max_req = WeightsRequest {
            format: OutputFormat::Multinode,
            group_by: GroupBy::INSTANCE,
            aggregation: Aggregation::Max,
            ..Default::default()
        };
        let max_rendered = render(&max_req, &outcome(), &ranked);
        let max_rows = max_rendered["result"].as_array().unwrap();
        assert!((max_rows[0][5].as_f64().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn multinode_group_by_nulls_out_non_uniform_dictionary_fields() {
        // Grouping by instance only: dimension varies within the group, so
        // its dictionary index must come back null rather than the first
        // member's arbitrarily.
        let request = WeightsRequest {
            format: OutputFormat::Multinode,
            group_by: GroupBy::INSTANCE,
            ..Default::default()
        };
        let ranked =
            vec![result("h1", "system.cpu", "cpu", "user", 0.4), result("h1", "system.cpu", "cpu", "system", 0.6)];
        let rendered = render(&request, &outcome(), &ranked);
        let rows = rendered["result"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0][4].is_null(), "dimension index (di) must be null: not part of the group key");
        assert!(!rows[0][2].is_null(), "context index (ci) is uniform across the group");
    }

    #[test]
    fn mcp_shape_truncates_past_cardinality_limit() {
        let request =
            WeightsRequest { format: OutputFormat::Mcp, cardinality_limit: 1, ..Default::default() };
        let ranked = vec![
            result("h1", "system.cpu", "cpu", "user", 0.9),
            result("h2", "system.cpu", "cpu", "user", 0.5),
        ];
        let rendered = render(&request, &outcome(), &ranked);
        assert_eq!(rendered["results"].as_array().unwrap().len(), 1);
        assert_eq!(rendered["metadata"]["truncated"], json!(true));
    }

    #[test]
    fn mcp_shape_sorts_results_descending_by_score() {
        let request = WeightsRequest { format: OutputFormat::Mcp, ..Default::default() };
        let ranked = vec![result("h1", "a", "i", "low", 0.1), result("h1", "a", "i", "high", 0.9)];
        let rendered = render(&request, &outcome(), &ranked);
        let results = rendered["results"].as_array().unwrap();
        assert_eq!(results[0][3], json!("high"));
        assert_eq!(results[1][3], json!("low"));
    }

    #[test]
    fn statistics_object_reports_query_time_and_per_tier_db_points() {
        let mut o = outcome();
        o.query_time_ms = 42;
        o.stats.result_points = 7;
        o.stats.add_tier_points(2, 11);
        let request = WeightsRequest::default();
        let rendered = render(&request, &o, &[]);
        assert_eq!(rendered["statistics"]["query_time_ms"], json!(42));
        assert_eq!(rendered["statistics"]["query_result_points"], json!(7));
        assert_eq!(rendered["statistics"]["db_points_per_tier"][2], json!(11));
    }

    #[test]
    fn envelope_echoes_window_method_and_options() {
        let request = WeightsRequest {
            method: WeightsMethod::Volume,
            options: Options::ANOMALY_BIT | Options::NONZERO,
            ..Default::default()
        };
        let rendered = render(&request, &outcome(), &[]);
        assert_eq!(rendered["after"], json!(0));
        assert_eq!(rendered["before"], json!(100));
        assert_eq!(rendered["method"], json!("volume"));
        let options = rendered["options"].as_array().unwrap();
        assert!(options.iter().any(|v| v == "anomaly-bit"));
        assert!(options.iter().any(|v| v == "nonzero"));
        assert_eq!(rendered["status"], json!(200));
    }

    #[test]
    fn rfc3339_option_formats_window_as_a_utc_string() {
        let request = WeightsRequest { options: Options::RFC3339, ..Default::default() };
        let rendered = render(&request, &outcome(), &[]);
        assert_eq!(rendered["after"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(rendered["before"], json!("1970-01-01T00:01:40Z"));
    }

    #[test]
    fn without_rfc3339_window_stays_epoch_seconds() {
        let request = WeightsRequest::default();
        let rendered = render(&request, &outcome(), &[]);
        assert_eq!(rendered["after"], json!(0));
        assert_eq!(rendered["before"], json!(100));
    }

    #[test]
    fn group_by_key_disambiguates_dimension_and_instance_with_host() {
        let r = result("h1", "system.cpu", "cpu", "user", 0.5);
        let key_with_asymmetry = group_by_key(GroupBy::DIMENSION | GroupBy::INSTANCE, &r);
        assert!(key_with_asymmetry.contains("h1"));

        // The inverse combination gets no such disambiguation (the
        // preserved asymmetry).
        let key_without = group_by_key(GroupBy::NODE, &r);
        assert!(!key_without.contains("cpu") || key_without == "h1");
    }
}
