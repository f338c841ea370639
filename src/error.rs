//! Error types for the selector
//!
//! Every error here is recoverable. Catalog failures degrade a level to an
//! empty candidate list, confirm failures leave the session as it was.
//! Protocol rejections are not errors at all - see
//! [`ProposalOutcome`](crate::protocol::ProposalOutcome).

use basin_types::{Level, LocationId};
use thiserror::Error;

/// Failure fetching children from the location catalog.
///
/// The `Display` output is what the resolver surfaces on the level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Transport(String),

    #[error("Catalog returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Catalog response could not be decoded: {0}")]
    Decode(String),

    #[error("Malformed {level} record #{index}: {reason}")]
    MalformedRecord {
        level: Level,
        index: usize,
        reason: String,
    },
}

/// Invalid use of the hierarchical resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("{id} is not a candidate at level {level}")]
    UnknownCandidate { level: Level, id: LocationId },

    #[error("Level {0} is selected through the map and dropdown surfaces")]
    NotSelectable(Level),

    #[error("No {0} selected yet")]
    ParentNotSelected(Level),
}

/// Failure confirming the current selection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("Cannot confirm an empty village selection")]
    EmptySelection,

    #[error("Selection is already confirmed")]
    AlreadyConfirmed,
}

/// Failure loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Timings must satisfy busy < lock < stale, got {busy_ms}/{lock_ms}/{stale_ms} ms")]
    TimingOrder {
        busy_ms: u64,
        lock_ms: u64,
        stale_ms: u64,
    },

    #[error("Invalid catalog base URL {url}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_error_display_is_user_facing() {
        let err = CatalogError::Status {
            status: 503,
            body: "upstream down".into(),
        };
        assert_eq!(err.to_string(), "Catalog returned 503: upstream down");

        let err = CatalogError::MalformedRecord {
            level: Level::Village,
            index: 2,
            reason: "missing field `population`".into(),
        };
        assert!(err.to_string().contains("village record #2"));
    }

    #[test]
    fn resolver_error_names_level() {
        let err = ResolverError::UnknownCandidate {
            level: Level::Drain,
            id: "D9".into(),
        };
        assert_eq!(err.to_string(), "D9 is not a candidate at level drain");
    }
}
