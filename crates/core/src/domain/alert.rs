use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::deal::DealId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SentimentDrop,
    HealthCritical,
    CompetitorMention,
    PositiveUpdate,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentimentDrop => "sentiment_drop",
            Self::HealthCritical => "health_critical",
            Self::CompetitorMention => "competitor_mention",
            Self::PositiveUpdate => "positive_update",
        }
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sentiment_drop" => Ok(Self::SentimentDrop),
            "health_critical" => Ok(Self::HealthCritical),
            "competitor_mention" => Ok(Self::CompetitorMention),
            "positive_update" => Ok(Self::PositiveUpdate),
            other => Err(format!("unknown alert type `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown alert severity `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub deal_id: DealId,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        deal_id: DealId,
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::generate(),
            deal_id,
            alert_type,
            severity,
            title: title.into(),
            description: description.into(),
            resolved: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AlertSeverity, AlertType};

    #[test]
    fn alert_type_round_trips_through_str() {
        for alert_type in [
            AlertType::SentimentDrop,
            AlertType::HealthCritical,
            AlertType::CompetitorMention,
            AlertType::PositiveUpdate,
        ] {
            let parsed: AlertType = alert_type.as_str().parse().expect("known type");
            assert_eq!(parsed, alert_type);
        }
    }

    #[test]
    fn severities_order_by_escalation() {
        assert!(AlertSeverity::Info < AlertSeverity::Warning);
        assert!(AlertSeverity::Warning < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }
}
