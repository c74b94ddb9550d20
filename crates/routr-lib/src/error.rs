use std::time::Duration;

use thiserror::Error;

/// Convenient result alias for the routr library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a spatial argument (resolution, coordinate, cell id) is unusable.
    #[error("invalid argument {argument}: {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },

    /// Raised when search criteria, optimization weights, or configuration are malformed.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Raised when a route or route set id is unknown.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Raised when the route store rejects a query or mutation.
    #[error("store {operation} failed: {message}")]
    Store { operation: String, message: String },

    /// Raised when a store response cannot be decoded.
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// Raised when a store call exceeds the caller deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Raised when the update queue is at capacity and the update was rejected.
    #[error("update queue is full (capacity {capacity}); update for route {route_id} rejected")]
    QueueFull { capacity: usize, route_id: String },

    /// Raised when the update queue no longer accepts updates.
    #[error("update queue is closed")]
    QueueClosed,

    /// Raised when an incident's route sets could not all be re-optimized.
    /// Each failure reads `set_id: error`.
    #[error("re-optimization after incident on route {route_id} failed for {} set(s): {}", .failures.len(), .failures.join("; "))]
    Reoptimization {
        route_id: String,
        failures: Vec<String>,
    },

    /// Reserved for finer-grained locking; the registry lock never raises it.
    #[error("concurrent modification of {id}")]
    ConcurrencyConflict { id: String },
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn route_set_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "route set",
            id: id.into(),
        }
    }

    pub(crate) fn store(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Store {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-friendly label, used for metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument { .. } => "invalid_argument",
            Error::Validation { .. } => "validation",
            Error::NotFound { .. } => "not_found",
            Error::Store { .. } => "store",
            Error::Decode { .. } => "decode",
            Error::Timeout { .. } => "timeout",
            Error::QueueFull { .. } => "queue_full",
            Error::QueueClosed => "queue_closed",
            Error::Reoptimization { .. } => "reoptimization",
            Error::ConcurrencyConflict { .. } => "concurrency_conflict",
        }
    }

    /// Whether this error originated from the persistence collaborator.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::Store { .. } | Error::Decode { .. } | Error::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = Error::route_set_not_found("set-1");
        assert_eq!(err.to_string(), "route set not found: set-1");
        assert_eq!(err.kind(), "not_found");
        assert!(!err.is_store_error());
    }

    #[test]
    fn decode_error_is_store_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::Decode {
            operation: "SearchRoutes".to_string(),
            source,
        };
        assert!(err.is_store_error());
        assert!(err.to_string().contains("SearchRoutes"));
    }

    #[test]
    fn reoptimization_lists_each_failed_set() {
        let err = Error::Reoptimization {
            route_id: "0x1".to_string(),
            failures: vec![
                "a: route set not found: a".to_string(),
                "b: route set not found: b".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "re-optimization after incident on route 0x1 failed for 2 set(s): \
             a: route set not found: a; b: route set not found: b"
        );
        assert_eq!(err.kind(), "reoptimization");
    }
}
