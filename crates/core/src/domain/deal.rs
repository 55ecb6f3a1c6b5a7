use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub String);

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the deal a flow operates on. Supplied by the caller at
/// trigger time and treated as read-only for the lifetime of the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DealContext {
    pub id: DealId,
    pub title: String,
    pub client_name: String,
    #[serde(default)]
    pub deal_value: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stage: Option<String>,
    /// Last known health score, if the deal has been monitored before.
    #[serde(default)]
    pub health_score: Option<u8>,
}
