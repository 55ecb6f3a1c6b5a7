use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::deal::DealId;
use crate::flows::definition::FlowName;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRunId(pub String);

impl FlowRunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for FlowRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRunStatus {
    Pending,
    Running,
    /// A step reported a retryable failure and will be attempted again.
    StepFailed,
    Completed,
    Failed,
}

impl FlowRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::StepFailed => "step_failed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for FlowRunStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "step_failed" => Ok(Self::StepFailed),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown flow run status `{other}`")),
        }
    }
}

/// Persisted snapshot of one flow execution. Only the runner mutates this;
/// it is written back after every step so an interrupted run can be
/// inspected (or resumed) from its last completed step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowRun {
    pub id: FlowRunId,
    pub flow: FlowName,
    pub deal_id: DealId,
    pub status: FlowRunStatus,
    pub current_step: Option<String>,
    pub step_index: usize,
    pub steps_completed: Vec<String>,
    /// Serialized flow state as of the last completed step.
    pub state_json: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlowRun {
    pub fn new(flow: FlowName, deal_id: DealId) -> Self {
        let now = Utc::now();
        Self {
            id: FlowRunId::generate(),
            flow,
            deal_id,
            status: FlowRunStatus::Pending,
            current_step: None,
            step_index: 0,
            steps_completed: Vec::new(),
            state_json: serde_json::Value::Object(serde_json::Map::new()),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    StepStarted,
    StepCompleted,
    StepRetried,
    RunCompleted,
    RunFailed,
}

/// One entry in a run's append-only progress log. `seq` is assigned by the
/// runner and strictly increases within a run, which lets subscribers that
/// see both the replayed history and the live feed drop duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: FlowRunId,
    pub seq: u64,
    pub kind: ProgressEventKind,
    pub step: Option<String>,
    pub status: FlowRunStatus,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ProgressEventKind::RunCompleted | ProgressEventKind::RunFailed)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::deal::DealId;
    use crate::flows::definition::FlowName;

    use super::{FlowRun, FlowRunStatus};

    #[test]
    fn new_runs_start_pending_with_empty_state() {
        let run = FlowRun::new(FlowName::Qualification, DealId("deal-1".to_string()));
        assert_eq!(run.status, FlowRunStatus::Pending);
        assert!(run.steps_completed.is_empty());
        assert_eq!(run.state_json, serde_json::json!({}));
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(FlowRunStatus::Completed.is_terminal());
        assert!(FlowRunStatus::Failed.is_terminal());
        assert!(!FlowRunStatus::Pending.is_terminal());
        assert!(!FlowRunStatus::Running.is_terminal());
        assert!(!FlowRunStatus::StepFailed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            FlowRunStatus::Pending,
            FlowRunStatus::Running,
            FlowRunStatus::StepFailed,
            FlowRunStatus::Completed,
            FlowRunStatus::Failed,
        ] {
            let parsed: FlowRunStatus = status.as_str().parse().expect("known status");
            assert_eq!(parsed, status);
        }
    }
}
