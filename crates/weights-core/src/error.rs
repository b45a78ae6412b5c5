//! Error types for the weights engine.
//!
//! Mirrors the rest of the codebase's habit of hand-rolled `Display` +
//! `std::error::Error` impls rather than a derive-macro crate.

use std::fmt;

/// Top-level failure of a weights request.
///
/// `NumericAnomaly` from the design's error taxonomy has no variant here:
/// it is recovered locally at the scorer boundary and never surfaces.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightsError {
    /// Window misspecified, or under 15 points after clamping.
    InvalidRange(String),
    /// The global deadline elapsed before fan-out completed.
    TimedOut,
    /// The caller's interrupt predicate fired before fan-out completed.
    Interrupted,
    /// No metric produced a usable score (legacy single-host callers only).
    NoResults,
}

impl WeightsError {
    /// HTTP-style status code for the user-visible error envelope (§6.3, §7).
    pub fn as_http_status(&self) -> u16 {
        match self {
            WeightsError::InvalidRange(_) => 400,
            WeightsError::TimedOut => 408,
            WeightsError::Interrupted => 499,
            WeightsError::NoResults => 404,
        }
    }
}

impl fmt::Display for WeightsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightsError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            WeightsError::TimedOut => write!(f, "timed out"),
            WeightsError::Interrupted => write!(f, "interrupted"),
            WeightsError::NoResults => write!(f, "no results"),
        }
    }
}

impl std::error::Error for WeightsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(WeightsError::InvalidRange("x".into()).as_http_status(), 400);
        assert_eq!(WeightsError::TimedOut.as_http_status(), 408);
        assert_eq!(WeightsError::Interrupted.as_http_status(), 499);
        assert_eq!(WeightsError::NoResults.as_http_status(), 404);
    }
}
