use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementCategory {
    Technical,
    Functional,
    Integration,
    Infrastructure,
    Security,
    Compliance,
    General,
}

impl RequirementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Functional => "functional",
            Self::Integration => "integration",
            Self::Infrastructure => "infrastructure",
            Self::Security => "security",
            Self::Compliance => "compliance",
            Self::General => "general",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementPriority {
    MustHave,
    ShouldHave,
    NiceToHave,
}

/// A single requirement lifted out of the source document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub category: RequirementCategory,
    pub text: String,
    pub priority: RequirementPriority,
    /// Extraction confidence reported by the model, in [0, 1].
    #[serde(default)]
    pub confidence: f64,
}

/// Named entities lifted out of the source document alongside requirements.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub budget_range: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub key_stakeholders: Vec<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub technologies_mentioned: Vec<String>,
}
