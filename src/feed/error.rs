//! Error taxonomy for the price feed.
//!
//! Four stable kinds, matchable by embedders across every operation.

use thiserror::Error;

/// Operation outcome used throughout the feed.
pub type Result<T, E = FeedError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// A required parameter is missing or malformed. Caller bug.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The operation targets a batch that does not exist or is not in the
    /// state the operation requires, or the service itself is in an
    /// incompatible state.
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    /// Reserved. Lookups report absent instruments as missing entries, not
    /// as errors.
    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// Runtime invariant violation. Should be unreachable.
    #[error("internal invariant violated: {reason}")]
    Internal { reason: String },
}

impl FeedError {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        FeedError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal_state(reason: impl Into<String>) -> Self {
        FeedError::IllegalState {
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        FeedError::Internal {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_reason() {
        let err = FeedError::illegal_state("batch b-1 is not active");
        assert_eq!(err.to_string(), "illegal state: batch b-1 is not active");
    }

    #[test]
    fn test_kinds_are_matchable() {
        let err = FeedError::invalid_argument("instrument id must not be empty");
        assert!(matches!(err, FeedError::InvalidArgument { .. }));
    }
}
