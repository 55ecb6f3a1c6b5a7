use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use dealforge_core::{
    Alert, AlertId, AlertRepository, AlertSeverity, AlertType, DealId, StorageError,
};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlAlertRepository {
    pool: DbPool,
}

impl SqlAlertRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, alert: &Alert) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO alert (
                id,
                deal_id,
                alert_type,
                severity,
                title,
                description,
                resolved,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                severity = excluded.severity,
                title = excluded.title,
                description = excluded.description,
                resolved = excluded.resolved",
        )
        .bind(&alert.id.0)
        .bind(&alert.deal_id.0)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(i64::from(alert.resolved))
        .bind(alert.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_unresolved(&self, deal_id: &DealId) -> Result<Vec<Alert>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, deal_id, alert_type, severity, title, description, resolved, created_at
             FROM alert
             WHERE deal_id = ? AND resolved = 0
             ORDER BY created_at ASC",
        )
        .bind(&deal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(alert_from_row).collect()
    }

    async fn mark_resolved(&self, id: &AlertId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE alert SET resolved = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AlertRepository for SqlAlertRepository {
    async fn unresolved_for_deal(&self, deal_id: &DealId) -> Result<Vec<Alert>, StorageError> {
        self.fetch_unresolved(deal_id).await.map_err(StorageError::from)
    }

    async fn save(&self, alert: &Alert) -> Result<(), StorageError> {
        self.upsert(alert).await.map_err(StorageError::from)
    }

    async fn resolve(&self, id: &AlertId) -> Result<(), StorageError> {
        self.mark_resolved(id).await.map_err(StorageError::from)
    }
}

fn alert_from_row(row: SqliteRow) -> Result<Alert, RepositoryError> {
    let type_raw = row.try_get::<String, _>("alert_type")?;
    let alert_type = type_raw.parse::<AlertType>().map_err(RepositoryError::Decode)?;

    let severity_raw = row.try_get::<String, _>("severity")?;
    let severity = severity_raw.parse::<AlertSeverity>().map_err(RepositoryError::Decode)?;

    let created_at_raw = row.try_get::<String, _>("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid created_at `{created_at_raw}` ({error})"))
        })?;

    Ok(Alert {
        id: AlertId(row.try_get("id")?),
        deal_id: DealId(row.try_get("deal_id")?),
        alert_type,
        severity,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        resolved: row.try_get::<i64, _>("resolved")? != 0,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use dealforge_core::{Alert, AlertRepository, AlertSeverity, AlertType, DealId};

    use super::SqlAlertRepository;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn unresolved_query_filters_out_resolved_alerts() {
        let pool = setup_pool().await;
        let repo = SqlAlertRepository::new(pool.clone());
        let deal = DealId("deal-1".to_string());

        let open = Alert::new(
            deal.clone(),
            AlertType::SentimentDrop,
            AlertSeverity::Warning,
            "Client sentiment is dropping",
            "weighted sentiment -0.4",
        );
        let closed = Alert::new(
            deal.clone(),
            AlertType::HealthCritical,
            AlertSeverity::High,
            "Deal health is below the floor",
            "health 42",
        );

        repo.save(&open).await.expect("save open alert");
        repo.save(&closed).await.expect("save closed alert");
        repo.resolve(&closed.id).await.expect("resolve alert");

        let unresolved = repo.unresolved_for_deal(&deal).await.expect("query unresolved");
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, open.id);
        assert_eq!(unresolved[0].alert_type, AlertType::SentimentDrop);

        pool.close().await;
    }

    #[tokio::test]
    async fn alerts_are_scoped_to_their_deal() {
        let pool = setup_pool().await;
        let repo = SqlAlertRepository::new(pool.clone());

        let alert = Alert::new(
            DealId("deal-1".to_string()),
            AlertType::CompetitorMention,
            AlertSeverity::High,
            "Competitor mentioned by the client",
            "signal",
        );
        repo.save(&alert).await.expect("save alert");

        let other =
            repo.unresolved_for_deal(&DealId("deal-2".to_string())).await.expect("query other");
        assert!(other.is_empty());

        pool.close().await;
    }
}
