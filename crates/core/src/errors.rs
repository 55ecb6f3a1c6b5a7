use thiserror::Error;

use crate::flows::run::FlowRunId;

/// Failure surfaced by a persistence collaborator. Kept as an opaque string
/// so the orchestration layer never depends on a concrete storage driver.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("storage failure: {0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("unknown flow `{0}` (expected qualification|proposal|monitoring)")]
    UnknownFlow(String),
    #[error("flow run not found: {0}")]
    NotFound(FlowRunId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("flow run was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::{FlowError, StorageError};

    #[test]
    fn unknown_flow_message_lists_valid_names() {
        let error = FlowError::UnknownFlow("enrichment".to_owned());
        let message = error.to_string();
        assert!(message.contains("enrichment"));
        assert!(message.contains("qualification|proposal|monitoring"));
    }

    #[test]
    fn storage_error_is_transparent() {
        let error = FlowError::from(StorageError::new("disk full"));
        assert_eq!(error.to_string(), "storage failure: disk full");
    }
}
