use crate::models::Coordinates;

/// Result of resolving a single geocoding query.
///
/// Everything except `Resolved` counts as unresolved. The variants are kept
/// apart so retry policy and reporting can tell them apart; the backfill
/// currently treats them all the same.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(Coordinates),
    /// The provider answered and had no candidate, or the query was empty.
    NotFound,
    /// Timeout, transport failure, 5xx or rate-limit response.
    Transient(String),
    /// A non-retryable failure: rejected request or malformed response.
    Failed(String),
    /// Never attempted because the run deadline had passed.
    Skipped,
}

impl GeocodeOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, GeocodeOutcome::Resolved(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, GeocodeOutcome::Transient(_))
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            GeocodeOutcome::Resolved(c) => Some(*c),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GeocodeOutcome::Resolved(_) => "resolved",
            GeocodeOutcome::NotFound => "not_found",
            GeocodeOutcome::Transient(_) => "transient",
            GeocodeOutcome::Failed(_) => "failed",
            GeocodeOutcome::Skipped => "skipped",
        }
    }
}
