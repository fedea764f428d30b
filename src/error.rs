//! Error types for the code-intelligence index.
//!
//! Structured errors via thiserror, grouped by subsystem, with actionable
//! messages and recovery suggestions on the main type.

use crate::types::{FileId, SymbolId};
use thiserror::Error;

/// Main error type for index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Symbol '{name}' not found. Did you index the file that defines it?")]
    SymbolNotFound { name: String },

    #[error("Symbol id {id:?} not found in the index. The file may have been removed.")]
    SymbolIdNotFound { id: SymbolId },

    #[error("File id {id:?} not found in index. The file may have been removed or never ingested.")]
    FileNotFound { id: FileId },

    #[error("Failed to create file id: maximum file count reached")]
    FileIdExhausted,

    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("Operation unavailable during bulk indexing: {operation}")]
    BulkIndexingInProgress { operation: String },

    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get recovery suggestions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::SymbolNotFound { .. } | Self::SymbolIdNotFound { .. } => vec![
                "Check that the defining file was ingested",
                "Run process_all_references after bulk ingest to resolve names",
            ],
            Self::FileNotFound { .. } => vec![
                "The file may have been removed; re-ingest it to restore its symbols",
            ],
            Self::BulkIndexingInProgress { .. } => vec![
                "Wait for bulk indexing to finish, then retry the query",
            ],
            Self::ConfigError { .. } => vec![
                "Check threshold ranges and rule direction/aggregation spellings",
            ],
            _ => vec![],
        }
    }
}

/// Errors from the graph propagator and its rule DSL.
#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("Invalid {field} in rule '{rule}': {reason}")]
    InvalidRule {
        rule: String,
        field: String,
        reason: String,
    },

    #[error("Failed to parse custom rule '{rule}': {reason}")]
    DslParse { rule: String, reason: String },

    #[error("Unknown direction '{value}' (expected upstream, downstream, or bidirectional)")]
    UnknownDirection { value: String },

    #[error("Unknown aggregation '{value}' (expected sum, max, unique, concat, or weighted_sum)")]
    UnknownAggregation { value: String },

    #[error("Unknown weight function '{value}' (expected linear, exponential, or log)")]
    UnknownWeightFunction { value: String },
}

/// Errors from the context lookup engine. Only the absence of a core
/// component or an invalid object id is fatal; section failures are reported
/// in the context's diagnostics instead.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Invalid object id {raw}: not a known symbol")]
    InvalidObjectId { raw: u64 },

    #[error("Reference tracker is not available")]
    MissingTracker,

    #[error("Symbol index is not available")]
    MissingSymbolIndex,
}

/// Result type alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Result type alias for context lookups.
pub type ContextResult<T> = Result<T, ContextError>;

/// Helper trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, msg: &str) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_actionable() {
        let err = IndexError::SymbolNotFound {
            name: "Handler".to_string(),
        };
        assert!(err.to_string().contains("Handler"));
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_error_context_helper() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let with_context = result.context("loading config");
        let message = with_context.unwrap_err().to_string();
        assert!(message.contains("loading config"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_unknown_direction_message() {
        let err = PropagationError::UnknownDirection {
            value: "sideways".to_string(),
        };
        assert!(err.to_string().contains("sideways"));
        assert!(err.to_string().contains("upstream"));
    }
}
