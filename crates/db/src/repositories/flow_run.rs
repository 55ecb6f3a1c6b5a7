use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use dealforge_core::{
    FlowName, FlowRun, FlowRunId, FlowRunRepository, FlowRunStatus, StorageError,
};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlFlowRunRepository {
    pool: DbPool,
}

impl SqlFlowRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, run: &FlowRun) -> Result<(), RepositoryError> {
        let steps_completed = serde_json::to_string(&run.steps_completed)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let state_json = serde_json::to_string(&run.state_json)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO flow_run (
                id,
                flow,
                deal_id,
                status,
                current_step,
                step_index,
                steps_completed,
                state_json,
                error,
                created_at,
                updated_at,
                completed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                current_step = excluded.current_step,
                step_index = excluded.step_index,
                steps_completed = excluded.steps_completed,
                state_json = excluded.state_json,
                error = excluded.error,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at",
        )
        .bind(&run.id.0)
        .bind(run.flow.as_str())
        .bind(&run.deal_id.0)
        .bind(run.status.as_str())
        .bind(run.current_step.as_deref())
        .bind(run.step_index as i64)
        .bind(steps_completed)
        .bind(state_json)
        .bind(run.error.as_deref())
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .bind(run.completed_at.map(|value| value.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: &FlowRunId) -> Result<Option<FlowRun>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                flow,
                deal_id,
                status,
                current_step,
                step_index,
                steps_completed,
                state_json,
                error,
                created_at,
                updated_at,
                completed_at
             FROM flow_run
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(run_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl FlowRunRepository for SqlFlowRunRepository {
    async fn save(&self, run: &FlowRun) -> Result<(), StorageError> {
        self.upsert(run).await.map_err(StorageError::from)
    }

    async fn load(&self, id: &FlowRunId) -> Result<Option<FlowRun>, StorageError> {
        self.fetch(id).await.map_err(StorageError::from)
    }
}

fn run_from_row(row: SqliteRow) -> Result<FlowRun, RepositoryError> {
    let flow_raw = row.try_get::<String, _>("flow")?;
    let flow = flow_raw
        .parse::<FlowName>()
        .map_err(|_| RepositoryError::Decode(format!("unknown flow `{flow_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = status_raw.parse::<FlowRunStatus>().map_err(RepositoryError::Decode)?;

    let steps_completed_raw = row.try_get::<String, _>("steps_completed")?;
    let steps_completed: Vec<String> = serde_json::from_str(&steps_completed_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid steps_completed: {error}")))?;

    let state_json_raw = row.try_get::<String, _>("state_json")?;
    let state_json: serde_json::Value = serde_json::from_str(&state_json_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid state_json: {error}")))?;

    let step_index = row.try_get::<i64, _>("step_index")?;
    let step_index = usize::try_from(step_index).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `step_index`: {step_index}"))
    })?;

    Ok(FlowRun {
        id: FlowRunId(row.try_get("id")?),
        flow,
        deal_id: dealforge_core::DealId(row.try_get("deal_id")?),
        status,
        current_step: row.try_get("current_step")?,
        step_index,
        steps_completed,
        state_json,
        error: row.try_get("error")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
