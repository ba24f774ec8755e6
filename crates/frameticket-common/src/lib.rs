pub mod config;

pub use config::{
    AssemblyLimits, ComplianceConfig, EngineConfig, QualityConfig, ScanConfig, SeverityWeights,
};

use serde::{Deserialize, Serialize};

/// Stable, serializable classification of a [`FrameTicketError`].
/// Batch outcomes carry this in place of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedTree,
    EmptySelection,
    UnknownIndex,
    NodeNotFound,
    InvalidTicket,
    Config,
    Json,
    Generic,
}

/// Common error types
#[derive(thiserror::Error, Debug)]
pub enum FrameTicketError {
    #[error("Malformed node tree: {0}")]
    MalformedTree(String),

    #[error("Selection is empty")]
    EmptySelection,

    #[error("Scan index belongs to snapshot {expected}, but the tree is snapshot {actual}")]
    UnknownIndex { expected: String, actual: String },

    #[error("Node not found in snapshot: {0}")]
    NodeNotFound(String),

    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl FrameTicketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameTicketError::MalformedTree(_) => ErrorKind::MalformedTree,
            FrameTicketError::EmptySelection => ErrorKind::EmptySelection,
            FrameTicketError::UnknownIndex { .. } => ErrorKind::UnknownIndex,
            FrameTicketError::NodeNotFound(_) => ErrorKind::NodeNotFound,
            FrameTicketError::InvalidTicket(_) => ErrorKind::InvalidTicket,
            FrameTicketError::Config(_) => ErrorKind::Config,
            FrameTicketError::Json(_) => ErrorKind::Json,
            FrameTicketError::Generic(_) => ErrorKind::Generic,
        }
    }

    /// Core operations are deterministic, so none of these go away on retry.
    /// Retrying only makes sense after the caller changes its input.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, FrameTicketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FrameTicketError::EmptySelection.kind(), ErrorKind::EmptySelection);
        assert_eq!(
            FrameTicketError::MalformedTree("cycle".into()).kind(),
            ErrorKind::MalformedTree
        );
        let err = FrameTicketError::UnknownIndex {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(err.kind(), ErrorKind::UnknownIndex);
        assert!(err.to_string().contains("snapshot a"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EmptySelection).unwrap();
        assert_eq!(json, "\"empty_selection\"");
    }
}
