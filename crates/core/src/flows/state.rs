use serde::{Deserialize, Serialize};

use crate::domain::communication::Communication;
use crate::domain::deal::DealContext;
use crate::domain::employee::{Employee, TeamAssignment};
use crate::domain::requirement::{ExtractedEntities, Requirement};
use crate::monitoring::{HealthReport, RecoveryEmail, SentimentReading};
use crate::proposal::{ComplianceReport, ProposalSection, RetrievedFragment};
use crate::qualification::{GapAnalysis, QualificationDecision, SkillMatch};

/// Everything a caller supplies when triggering a flow. Which fields are
/// consulted depends on the flow: qualification reads `document_text` and
/// `employees`, proposal reads `requirements` and `team`, monitoring reads
/// `communications`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowInput {
    pub deal: DealContext,
    #[serde(default)]
    pub document_text: Option<String>,
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub team: Vec<TeamAssignment>,
    /// Newest first.
    #[serde(default)]
    pub communications: Vec<Communication>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub word_count: usize,
    pub char_count: usize,
}

/// Accumulating state for the qualification pipeline. Each step fills in
/// its own fields and leaves the rest untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualificationState {
    pub deal: DealContext,
    pub document_text: String,
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub gap_analysis: Option<GapAnalysis>,
    #[serde(default)]
    pub matches: Vec<SkillMatch>,
    #[serde(default)]
    pub decision: Option<QualificationDecision>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl QualificationState {
    pub fn from_input(input: &FlowInput) -> Self {
        Self {
            deal: input.deal.clone(),
            document_text: input.document_text.clone().unwrap_or_default(),
            employees: input.employees.clone(),
            metadata: None,
            requirements: Vec::new(),
            entities: ExtractedEntities::default(),
            gap_analysis: None,
            matches: Vec::new(),
            decision: None,
            warnings: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalState {
    pub deal: DealContext,
    pub requirements: Vec<Requirement>,
    pub team: Vec<TeamAssignment>,
    #[serde(default)]
    pub fragments: Vec<RetrievedFragment>,
    #[serde(default)]
    pub draft: Option<String>,
    #[serde(default)]
    pub sections: Vec<ProposalSection>,
    #[serde(default)]
    pub compliance: Option<ComplianceReport>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ProposalState {
    pub fn from_input(input: &FlowInput) -> Self {
        Self {
            deal: input.deal.clone(),
            requirements: input.requirements.clone(),
            team: input.team.clone(),
            fragments: Vec::new(),
            draft: None,
            sections: Vec::new(),
            compliance: None,
            warnings: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringState {
    pub deal: DealContext,
    /// Newest first.
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub readings: Vec<SentimentReading>,
    #[serde(default)]
    pub health: Option<HealthReport>,
    /// Alerts this run raised, after dedup against unresolved ones.
    #[serde(default)]
    pub new_alerts: Vec<crate::domain::alert::Alert>,
    /// Unresolved alerts loaded for dedup and recovery gating.
    #[serde(default)]
    pub active_alerts: Vec<crate::domain::alert::Alert>,
    #[serde(default)]
    pub recovery_email: Option<RecoveryEmail>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl MonitoringState {
    pub fn from_input(input: &FlowInput) -> Self {
        Self {
            deal: input.deal.clone(),
            communications: input.communications.clone(),
            readings: Vec::new(),
            health: None,
            new_alerts: Vec::new(),
            active_alerts: Vec::new(),
            recovery_email: None,
            warnings: Vec::new(),
        }
    }
}
