pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod monitoring;
pub mod proposal;
pub mod qualification;
pub mod repository;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::alert::{Alert, AlertId, AlertSeverity, AlertType};
pub use domain::communication::{Communication, CommunicationKind};
pub use domain::deal::{DealContext, DealId};
pub use domain::employee::{Employee, EmployeeId, TeamAssignment};
pub use domain::profile::{CompanyProfile, ProfileError};
pub use domain::requirement::{
    ExtractedEntities, Requirement, RequirementCategory, RequirementPriority,
};
pub use errors::{FlowError, StorageError};
pub use flows::definition::{FlowDefinition, FlowName};
pub use flows::run::{FlowRun, FlowRunId, FlowRunStatus, ProgressEvent, ProgressEventKind};
pub use flows::state::{
    DocumentMetadata, FlowInput, MonitoringState, ProposalState, QualificationState,
};
pub use flows::step::StepResult;
pub use monitoring::{
    AlertThresholds, HealthReport, HealthWeights, RecoveryEmail, SentimentReading, Trend,
};
pub use proposal::{
    ComplianceItem, ComplianceReport, ComplianceStatus, ProposalSection, RetrievedFragment,
};
pub use qualification::{
    DecisionWeights, GapAnalysis, QualificationDecision, Recommendation, ResourceEstimate,
    SkillMatch,
};
pub use repository::{AlertRepository, FlowRunRepository};
