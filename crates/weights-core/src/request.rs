//! The request model (spec §6.1).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightsMethod {
    Ks2,
    Volume,
    AnomalyRate,
    Value,
}

impl Default for WeightsMethod {
    fn default() -> Self {
        WeightsMethod::Ks2
    }
}

impl WeightsMethod {
    /// Parses the same four aliases the original CLI/URL parser accepts,
    /// falling back to `Ks2` for anything unrecognized (matching
    /// `weights_string_to_method`'s default).
    pub fn from_str_lenient(s: &str) -> Self {
        match s {
            "volume" => WeightsMethod::Volume,
            "anomaly-rate" => WeightsMethod::AnomalyRate,
            "value" => WeightsMethod::Value,
            _ => WeightsMethod::Ks2,
        }
    }

    pub fn requires_baseline(&self) -> bool {
        matches!(self, WeightsMethod::Ks2 | WeightsMethod::Volume)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Charts,
    Contexts,
    Multinode,
    Mcp,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Charts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeGrouping {
    Average,
    Min,
    Max,
    Sum,
    CountIf,
}

impl Default for TimeGrouping {
    fn default() -> Self {
        TimeGrouping::Average
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    ArithMean,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Avg
    }
}

bitflags! {
    /// `options` (spec §6.1) — no teacher crate in the corpus models a
    /// request-level bit-set, so this is enriched from the rest of the
    /// retrieval pack rather than imitating the teacher directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Options: u32 {
        const ANOMALY_BIT      = 1 << 0;
        const NONZERO           = 1 << 1;
        const NATURAL_POINTS    = 1 << 2;
        const MATCH_IDS         = 1 << 3;
        const MINIFY            = 1 << 4;
        const RAW               = 1 << 5;
        const RFC3339           = 1 << 6;
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::empty()
    }
}

bitflags! {
    /// `group_by` (spec §6.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GroupBy: u32 {
        const DIMENSION = 1 << 0;
        const INSTANCE  = 1 << 1;
        const NODE      = 1 << 2;
        const CONTEXT   = 1 << 3;
        const UNITS     = 1 << 4;
    }
}

impl Default for GroupBy {
    fn default() -> Self {
        GroupBy::empty()
    }
}

pub const DEFAULT_POINTS: u32 = 500;
pub const DEFAULT_TIMEOUT_MS: u32 = 300_000;
pub const MIN_TIMEOUT_MS: u32 = 1_000;
pub const DEFAULT_CARDINALITY_LIMIT: u32 = 50;
pub const MIN_CARDINALITY_LIMIT: u32 = 30;

/// A selector expressed as glob patterns, simple/positive matches only
/// (the pattern-compilation machinery itself is storage-engine territory,
/// out of scope per spec §1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selector {
    pub scope: Vec<String>,
    pub include: Vec<String>,
}

impl Selector {
    pub fn matches_all(&self) -> bool {
        self.scope.is_empty() && self.include.is_empty()
    }

    /// Whether `name` passes both the `scope` and `include` pattern sets
    /// (empty sets match everything, matching `foreach_*`'s treatment of an
    /// unset selector in spec §6.3).
    pub fn is_match(&self, name: &str) -> bool {
        let scope_ok = self.scope.is_empty() || self.scope.iter().any(|p| crate::util::glob_match(p, name));
        let include_ok =
            self.include.is_empty() || self.include.iter().any(|p| crate::util::glob_match(p, name));
        scope_ok && include_ok
    }

    /// A selector that names exactly one literal (no glob metacharacters)
    /// in `include` and nothing in `scope` — used by C4's multi-dimensional
    /// fast path to decide whether a request is "restricted to a specific
    /// context" (spec §4.4).
    pub fn single_literal(&self) -> Option<&str> {
        if !self.scope.is_empty() || self.include.len() != 1 {
            return None;
        }
        let pattern = self.include[0].as_str();
        if pattern.contains(['*', '?']) { None } else { Some(pattern) }
    }
}

/// Two global mutable settings the original C carries as `static` variables
/// (`enable_metric_correlations`, `metric_correlations_version`), lifted to
/// per-run configuration passed by value (spec §9 design note).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub enabled: bool,
    pub correlations_version: u32,
    pub worker_count_override: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { enabled: true, correlations_version: 1, worker_count_override: None }
    }
}

/// A user-supplied predicate checked cooperatively at metric boundaries
/// (spec §5 "Cancellation").
pub type InterruptCallback = std::sync::Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct WeightsRequest {
    pub method: WeightsMethod,
    pub format: OutputFormat,
    pub after: i64,
    pub before: i64,
    pub baseline_after: i64,
    pub baseline_before: i64,
    pub points: u32,
    pub tier: u8,
    pub time_group: TimeGrouping,
    pub time_group_options: Option<String>,
    pub options: Options,
    pub nodes: Selector,
    pub contexts: Selector,
    pub instances: Selector,
    pub dimensions: Selector,
    pub labels: Selector,
    pub group_by: GroupBy,
    pub aggregation: Aggregation,
    pub timeout_ms: u32,
    pub cardinality_limit: u32,
    pub interrupt_callback: Option<InterruptCallback>,
    pub transaction_id: Option<String>,
}

impl std::fmt::Debug for WeightsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightsRequest")
            .field("method", &self.method)
            .field("format", &self.format)
            .field("after", &self.after)
            .field("before", &self.before)
            .field("baseline_after", &self.baseline_after)
            .field("baseline_before", &self.baseline_before)
            .field("points", &self.points)
            .field("tier", &self.tier)
            .field("time_group", &self.time_group)
            .field("options", &self.options)
            .field("group_by", &self.group_by)
            .field("aggregation", &self.aggregation)
            .field("timeout_ms", &self.timeout_ms)
            .field("cardinality_limit", &self.cardinality_limit)
            .field("has_interrupt_callback", &self.interrupt_callback.is_some())
            .field("transaction_id", &self.transaction_id)
            .finish()
    }
}

impl Default for WeightsRequest {
    fn default() -> Self {
        WeightsRequest {
            method: WeightsMethod::default(),
            format: OutputFormat::default(),
            after: 0,
            before: 0,
            baseline_after: 0,
            baseline_before: 0,
            points: DEFAULT_POINTS,
            tier: 0,
            time_group: TimeGrouping::default(),
            time_group_options: None,
            options: Options::default(),
            nodes: Selector::default(),
            contexts: Selector::default(),
            instances: Selector::default(),
            dimensions: Selector::default(),
            labels: Selector::default(),
            group_by: GroupBy::default(),
            aggregation: Aggregation::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cardinality_limit: DEFAULT_CARDINALITY_LIMIT,
            interrupt_callback: None,
            transaction_id: None,
        }
    }
}

impl WeightsRequest {
    /// Clamps `timeout_ms`/`cardinality_limit` to their spec-mandated
    /// minimums; used by the coordinator before validation.
    pub fn clamp_defaults(&mut self) {
        if self.timeout_ms < MIN_TIMEOUT_MS {
            self.timeout_ms = MIN_TIMEOUT_MS;
        }
        if self.format == OutputFormat::Mcp && self.cardinality_limit < MIN_CARDINALITY_LIMIT {
            self.cardinality_limit = MIN_CARDINALITY_LIMIT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_falls_back_to_ks2() {
        assert_eq!(WeightsMethod::from_str_lenient("volume"), WeightsMethod::Volume);
        assert_eq!(WeightsMethod::from_str_lenient("nonsense"), WeightsMethod::Ks2);
    }

    #[test]
    fn clamp_defaults_enforces_minimums() {
        let mut req = WeightsRequest { timeout_ms: 10, format: OutputFormat::Mcp, cardinality_limit: 1, ..Default::default() };
        req.clamp_defaults();
        assert_eq!(req.timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(req.cardinality_limit, MIN_CARDINALITY_LIMIT);
    }

    #[test]
    fn cardinality_limit_untouched_outside_mcp() {
        let mut req = WeightsRequest { cardinality_limit: 1, ..Default::default() };
        req.clamp_defaults();
        assert_eq!(req.cardinality_limit, 1);
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = Selector::default();
        assert!(sel.is_match("anything"));
    }

    #[test]
    fn selector_requires_both_scope_and_include() {
        let sel = Selector { scope: vec!["system.*".into()], include: vec!["*cpu*".into()] };
        assert!(sel.is_match("system.cpu"));
        assert!(!sel.is_match("system.mem"));
        assert!(!sel.is_match("disk.cpu_wait"));
    }

    #[test]
    fn single_literal_detects_exact_one_item_include() {
        let sel = Selector { scope: vec![], include: vec!["system.cpu".into()] };
        assert_eq!(sel.single_literal(), Some("system.cpu"));

        let glob_sel = Selector { scope: vec![], include: vec!["system.*".into()] };
        assert_eq!(glob_sel.single_literal(), None);

        let scoped_sel =
            Selector { scope: vec!["a".into()], include: vec!["system.cpu".into()] };
        assert_eq!(scoped_sel.single_literal(), None);
    }
}
