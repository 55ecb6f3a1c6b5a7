use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationKind {
    Email,
    Call,
    Meeting,
    Note,
}

/// One client-facing touchpoint on a deal. Monitoring expects the caller to
/// supply these newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub kind: CommunicationKind,
    pub date: DateTime<Utc>,
    pub from: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
}
