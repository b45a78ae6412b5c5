//! Metric identity — the registry key (spec §3).
//!
//! The source keys its results dictionary on the acquired pointer address of
//! the metric (`snprintfz(buf, ..., "%p", rma)` in `weights.c`). That is
//! exactly the kind of pointer-identity hack spec §9 calls out for
//! replacement: here identity is the stable string tuple
//! `(host, context, instance, metric)`, hashed the way the teacher's
//! `StringInterner` hashes strings (`storage/interner.rs`, `xxh3_64`) rather
//! than compared as owned `String`s on every hash-map probe.

use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Stable identifier for one leaf metric: `(host, context, instance, metric)`.
///
/// `Eq`/`Hash` are derived from the 64-bit digest of the four joined
/// strings, not from the strings themselves, so registry inserts stay O(1)
/// regardless of identifier length; the strings are kept alongside for
/// rendering and tie-break sorting.
#[derive(Debug, Clone)]
pub struct MetricIdentity {
    pub host: String,
    pub context: String,
    pub instance: String,
    pub metric: String,
    digest: u64,
}

impl MetricIdentity {
    pub fn new(
        host: impl Into<String>,
        context: impl Into<String>,
        instance: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        let host = host.into();
        let context = context.into();
        let instance = instance.into();
        let metric = metric.into();
        let digest = digest_of(&host, &context, &instance, &metric);
        MetricIdentity { host, context, instance, metric, digest }
    }

    /// Opaque, collision-resistant key suitable for use as a `HashMap` key.
    pub fn key(&self) -> u64 {
        self.digest
    }
}

fn digest_of(host: &str, context: &str, instance: &str, metric: &str) -> u64 {
    // Separator bytes guard against identifier-boundary collisions, e.g.
    // ("ab", "c") vs ("a", "bc") hashing the same concatenation.
    let mut buf = String::with_capacity(host.len() + context.len() + instance.len() + metric.len() + 4);
    buf.push_str(host);
    buf.push('\0');
    buf.push_str(context);
    buf.push('\0');
    buf.push_str(instance);
    buf.push('\0');
    buf.push_str(metric);
    xxh3_64(buf.as_bytes())
}

impl PartialEq for MetricIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
            && self.host == other.host
            && self.context == other.context
            && self.instance == other.instance
            && self.metric == other.metric
    }
}
impl Eq for MetricIdentity {}

impl std::hash::Hash for MetricIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.host, self.context, self.instance, self.metric)
    }
}
