//! Persistence collaborator traits. Declared here so the orchestration
//! layer depends on behavior, not on a storage driver; the db crate
//! provides the SQL implementations and in-memory doubles.

use async_trait::async_trait;

use crate::domain::alert::{Alert, AlertId};
use crate::domain::deal::DealId;
use crate::errors::StorageError;
use crate::flows::run::{FlowRun, FlowRunId};

/// Durable store for flow run snapshots. The runner calls `save` after
/// every step, so a crashed run can always be inspected from its last
/// completed step.
#[async_trait]
pub trait FlowRunRepository: Send + Sync {
    async fn save(&self, run: &FlowRun) -> Result<(), StorageError>;
    async fn load(&self, id: &FlowRunId) -> Result<Option<FlowRun>, StorageError>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn unresolved_for_deal(&self, deal_id: &DealId) -> Result<Vec<Alert>, StorageError>;
    async fn save(&self, alert: &Alert) -> Result<(), StorageError>;
    async fn resolve(&self, id: &AlertId) -> Result<(), StorageError>;
}
