//! weights-core — the Metric Correlations / Weights Engine.
//!
//! Given a "highlighted" time window and an optional "baseline" window
//! across a fleet of time-series metrics, ranks every metric by how
//! strongly its behavior distinguishes the highlight from the baseline.
//!
//! Modules, leaves first:
//! - [`ks`] — C1, the Kolmogorov-Smirnov distribution oracle (`ks_cdf`/`ks_fbar`).
//! - [`scorer`] — C2-C4, the KS2/volume/value-and-anomaly-rate scorers.
//! - [`registry`] — C5, the per-run result multiset and its merge semantics.
//! - [`query`] — the external query-interface contract (spec §6.3) plus a
//!   `MockCollaborator` used by tests and `weights-cli`.
//! - [`coordinator`] — C6, host/context/instance fan-out, the deadline and
//!   interrupt model, and registry merge.
//! - [`rank`] and [`render`] — C7, even-spread normalization and the four
//!   output shapes.
//! - [`window`], [`identity`], [`request`], [`error`] — the shared data model.

pub mod coordinator;
pub mod error;
pub mod identity;
pub mod ks;
pub mod query;
pub mod rank;
pub mod registry;
pub mod render;
pub mod request;
pub mod scorer;
pub mod util;
pub mod window;
