use thiserror::Error;

use dealforge_core::StorageError;

pub mod alert;
pub mod flow_run;
pub mod memory;

pub use alert::SqlAlertRepository;
pub use flow_run::SqlFlowRunRepository;
pub use memory::{InMemoryAlertRepository, InMemoryFlowRunRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StorageError {
    fn from(value: RepositoryError) -> Self {
        StorageError::new(value.to_string())
    }
}
