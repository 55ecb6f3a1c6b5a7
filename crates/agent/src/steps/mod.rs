//! The twelve step implementations behind the three pipelines. Steps are
//! read-only towards shared state: each one receives the current flow state
//! by reference and returns the complete next state on success.

pub mod monitoring;
pub mod proposal;
pub mod qualification;

use std::sync::Arc;

use async_trait::async_trait;

use dealforge_core::{
    AlertRepository, AlertThresholds, AppConfig, CompanyProfile, DecisionWeights, HealthWeights,
    MonitoringState, ProposalState, QualificationState, StepResult,
};

use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::prompts::PromptBuilder;
use crate::retriever::Retriever;

#[derive(Clone, Debug)]
pub struct StepConfig {
    /// Extra in-step attempts for a transient LLM failure before the step
    /// reports a retryable result to the runner.
    pub llm_max_retries: u32,
    pub max_fragments: usize,
    pub decision: DecisionWeights,
    pub health: HealthWeights,
    pub alerts: AlertThresholds,
}

impl StepConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            llm_max_retries: config.llm.max_retries,
            max_fragments: config.retrieval.max_fragments,
            decision: config.scoring.decision,
            health: config.scoring.health,
            alerts: config.scoring.alerts,
        }
    }
}

/// Shared collaborators handed to every step.
pub struct StepContext {
    pub profile: Arc<CompanyProfile>,
    pub llm: Arc<dyn LlmClient>,
    pub retriever: Arc<dyn Retriever>,
    pub alerts: Arc<dyn AlertRepository>,
    pub prompts: PromptBuilder,
    pub config: StepConfig,
}

impl StepContext {
    /// One logical completion with a bounded in-step retry on transient
    /// transport failures. Anything that survives the bound surfaces as an
    /// error for the step to classify.
    pub(crate) async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.llm.complete(prompt, options).await {
                Ok(response) => return Ok(response),
                Err(error) if attempt < self.config.llm_max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        event_name = "llm_retry",
                        attempt,
                        error = %error,
                        "transient llm failure, retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
pub trait FlowStep<S>: Send + Sync {
    fn id(&self) -> &'static str;
    async fn execute(&self, state: &S, ctx: &StepContext) -> StepResult<S>;
}

pub fn qualification_pipeline() -> Vec<Box<dyn FlowStep<QualificationState>>> {
    vec![
        Box::new(qualification::Ingest),
        Box::new(qualification::Extract),
        Box::new(qualification::Analyze),
        Box::new(qualification::Match),
        Box::new(qualification::Decide),
    ]
}

pub fn proposal_pipeline() -> Vec<Box<dyn FlowStep<ProposalState>>> {
    vec![Box::new(proposal::Retrieve), Box::new(proposal::Generate), Box::new(proposal::Comply)]
}

pub fn monitoring_pipeline() -> Vec<Box<dyn FlowStep<MonitoringState>>> {
    vec![
        Box::new(monitoring::Sentiment),
        Box::new(monitoring::Health),
        Box::new(monitoring::AlertStep),
        Box::new(monitoring::Recovery),
    ]
}
