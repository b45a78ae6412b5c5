//! Scorers (C2-C4): turn queried series/values into a value to register.
//!
//! Each scorer is split the same way `ks2` already was: a pure-math layer
//! that operates on plain numbers (easy to test, no collaborator), and a
//! thin `score` wrapper that drives the [`crate::query::QuerySource`] and
//! packages the result as a [`ScoreOutcome`] for the coordinator to insert
//! into a [`crate::registry::Registry`].

pub mod ks2;
pub mod value;
pub mod volume;

use crate::query::StoragePoint;
use crate::registry::ResultFlags;

/// What one scorer invocation produced for one leaf metric, before
/// registration. `value` is already oriented so that larger means "more
/// correlated" (KS2's survival probability is inverted at this layer, per
/// spec §4.7) but is not yet rank-normalized into `[0, 1]` — that is C7's
/// job.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub value: f64,
    pub flags: ResultFlags,
    pub highlighted: StoragePoint,
    pub baseline: Option<StoragePoint>,
    pub db_queries: u64,
    pub db_points: u64,
    pub result_points: u64,
    pub binary_searches: u64,
}
