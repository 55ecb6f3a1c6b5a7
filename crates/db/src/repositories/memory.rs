//! In-memory repository doubles for tests and local experimentation.

use std::collections::HashMap;

use tokio::sync::RwLock;

use dealforge_core::{
    Alert, AlertId, AlertRepository, DealId, FlowRun, FlowRunId, FlowRunRepository, StorageError,
};

#[derive(Default)]
pub struct InMemoryFlowRunRepository {
    runs: RwLock<HashMap<FlowRunId, FlowRun>>,
}

impl InMemoryFlowRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<FlowRun> {
        self.runs.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl FlowRunRepository for InMemoryFlowRunRepository {
    async fn save(&self, run: &FlowRun) -> Result<(), StorageError> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn load(&self, id: &FlowRunId) -> Result<Option<FlowRun>, StorageError> {
        Ok(self.runs.read().await.get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAlertRepository {
    alerts: RwLock<HashMap<AlertId, Alert>>,
}

impl InMemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn unresolved_for_deal(&self, deal_id: &DealId) -> Result<Vec<Alert>, StorageError> {
        let mut unresolved: Vec<Alert> = self
            .alerts
            .read()
            .await
            .values()
            .filter(|alert| &alert.deal_id == deal_id && !alert.resolved)
            .cloned()
            .collect();
        unresolved.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(unresolved)
    }

    async fn save(&self, alert: &Alert) -> Result<(), StorageError> {
        self.alerts.write().await.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn resolve(&self, id: &AlertId) -> Result<(), StorageError> {
        if let Some(alert) = self.alerts.write().await.get_mut(id) {
            alert.resolved = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dealforge_core::{
        Alert, AlertRepository, AlertSeverity, AlertType, DealId, FlowName, FlowRun,
        FlowRunRepository,
    };

    use super::{InMemoryAlertRepository, InMemoryFlowRunRepository};

    #[tokio::test]
    async fn in_memory_flow_run_repo_round_trips() {
        let repo = InMemoryFlowRunRepository::new();
        let run = FlowRun::new(FlowName::Monitoring, DealId("deal-1".to_string()));

        repo.save(&run).await.expect("save");
        let found = repo.load(&run.id).await.expect("load");
        assert_eq!(found, Some(run));
    }

    #[tokio::test]
    async fn resolve_removes_alert_from_unresolved_set() {
        let repo = InMemoryAlertRepository::new();
        let deal = DealId("deal-1".to_string());
        let alert = Alert::new(
            deal.clone(),
            AlertType::SentimentDrop,
            AlertSeverity::Warning,
            "Client sentiment is dropping",
            "test",
        );

        repo.save(&alert).await.expect("save");
        assert_eq!(repo.unresolved_for_deal(&deal).await.expect("query").len(), 1);

        repo.resolve(&alert.id).await.expect("resolve");
        assert!(repo.unresolved_for_deal(&deal).await.expect("query").is_empty());
    }
}
