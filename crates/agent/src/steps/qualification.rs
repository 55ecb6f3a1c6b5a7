use async_trait::async_trait;
use serde::Deserialize;

use dealforge_core::qualification::{
    confidence, deterministic_reasoning, must_have_coverage, rank_employees, recommend,
    requirement_keywords,
};
use dealforge_core::{
    DocumentMetadata, ExtractedEntities, GapAnalysis, QualificationDecision, QualificationState,
    Requirement, StepResult,
};

use crate::llm::{parse_json_payload, CompletionOptions};
use crate::steps::{FlowStep, StepContext};

pub struct Ingest;

#[async_trait]
impl FlowStep<QualificationState> for Ingest {
    fn id(&self) -> &'static str {
        "ingest"
    }

    async fn execute(&self, state: &QualificationState, _ctx: &StepContext) -> StepResult<QualificationState> {
        let text = state.document_text.trim();
        if text.is_empty() {
            return StepResult::fatal("document text is empty");
        }

        let mut next = state.clone();
        next.metadata = Some(DocumentMetadata {
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
        });
        StepResult::ok(next)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractPayload {
    #[serde(default)]
    requirements: Vec<Requirement>,
    #[serde(default)]
    entities: ExtractedEntities,
}

pub struct Extract;

#[async_trait]
impl FlowStep<QualificationState> for Extract {
    fn id(&self) -> &'static str {
        "extract"
    }

    async fn execute(&self, state: &QualificationState, ctx: &StepContext) -> StepResult<QualificationState> {
        let prompt = match ctx.prompts.extract(&state.deal, &state.document_text) {
            Ok(prompt) => prompt,
            Err(error) => return StepResult::fatal(error.to_string()),
        };

        let response = match ctx.complete(&prompt, CompletionOptions::default()).await {
            Ok(response) => response,
            Err(error) => return StepResult::retryable(error.to_string()),
        };

        let payload: ExtractPayload = match parse_json_payload(&response) {
            Ok(payload) => payload,
            Err(error) => {
                return StepResult::fatal(format!("unparseable extraction response: {error}"))
            }
        };

        let mut next = state.clone();
        next.requirements = payload.requirements;
        next.entities = payload.entities;
        if next.requirements.is_empty() {
            next.warnings.push("extraction found no requirements".to_string());
        }
        let count = next.requirements.len();
        StepResult::ok_with(next, format!("extracted {count} requirement(s)"))
    }
}

pub struct Analyze;

#[async_trait]
impl FlowStep<QualificationState> for Analyze {
    fn id(&self) -> &'static str {
        "analyze"
    }

    async fn execute(&self, state: &QualificationState, ctx: &StepContext) -> StepResult<QualificationState> {
        let prompt = match ctx.prompts.analyze(&ctx.profile, &state.employees, &state.requirements)
        {
            Ok(prompt) => prompt,
            Err(error) => return StepResult::fatal(error.to_string()),
        };

        let response = match ctx.complete(&prompt, CompletionOptions::default()).await {
            Ok(response) => response,
            Err(error) => return StepResult::retryable(error.to_string()),
        };

        let mut next = state.clone();
        match parse_json_payload::<GapAnalysis>(&response) {
            Ok(analysis) => next.gap_analysis = Some(analysis.clamped()),
            Err(error) => {
                // A malformed analysis is survivable: downstream scoring
                // falls back to neutral defaults.
                next.warnings.push(format!("gap analysis was unparseable, using defaults: {error}"));
                next.gap_analysis = Some(GapAnalysis::default());
            }
        }
        StepResult::ok(next)
    }
}

pub struct Match;

#[async_trait]
impl FlowStep<QualificationState> for Match {
    fn id(&self) -> &'static str {
        "match"
    }

    async fn execute(&self, state: &QualificationState, _ctx: &StepContext) -> StepResult<QualificationState> {
        let keywords = requirement_keywords(&state.requirements, state.gap_analysis.as_ref());
        let mut next = state.clone();
        next.matches = rank_employees(&state.employees, &keywords);
        let matched = next.matches.iter().filter(|m| m.match_score > 0).count();
        StepResult::ok_with(next, format!("{matched} of {} staff matched", state.employees.len()))
    }
}

#[derive(Debug, Deserialize)]
struct RationalePayload {
    #[serde(default)]
    positive_factors: Vec<String>,
    #[serde(default)]
    risk_factors: Vec<String>,
    #[serde(default)]
    conditions: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

pub struct Decide;

#[async_trait]
impl FlowStep<QualificationState> for Decide {
    fn id(&self) -> &'static str {
        "decide"
    }

    async fn execute(&self, state: &QualificationState, ctx: &StepContext) -> StepResult<QualificationState> {
        let analysis = state.gap_analysis.clone().unwrap_or_default();
        let coverage = must_have_coverage(&state.requirements, &state.matches);
        let weights = &ctx.config.decision;
        let decision_confidence = confidence(weights, &analysis, coverage);
        let recommendation =
            recommend(weights, decision_confidence, analysis.gap_areas.len());

        let mut decision = QualificationDecision {
            recommendation,
            confidence: decision_confidence,
            positive_factors: analysis.strong_areas.clone(),
            risk_factors: analysis.risk_factors.clone(),
            conditions: analysis.gap_areas.clone(),
            reasoning: deterministic_reasoning(recommendation, decision_confidence, &analysis),
        };

        let mut next = state.clone();

        // The numbers are final; the model only writes the narrative, and
        // any failure here degrades to the deterministic summary.
        let rationale = ctx
            .prompts
            .rationale(
                &state.deal,
                recommendation.as_str(),
                decision_confidence,
                &analysis,
                &state.matches,
            )
            .map_err(|error| error.to_string());
        match rationale {
            Ok(prompt) => match ctx.complete(&prompt, CompletionOptions::default()).await {
                Ok(response) => match parse_json_payload::<RationalePayload>(&response) {
                    Ok(payload) => {
                        decision.positive_factors = payload.positive_factors;
                        decision.risk_factors = payload.risk_factors;
                        decision.conditions = payload.conditions;
                        if !payload.reasoning.trim().is_empty() {
                            decision.reasoning = payload.reasoning;
                        }
                    }
                    Err(error) => next
                        .warnings
                        .push(format!("rationale was unparseable, using deterministic summary: {error}")),
                },
                Err(error) => next
                    .warnings
                    .push(format!("rationale call failed, using deterministic summary: {error}")),
            },
            Err(error) => next.warnings.push(format!("rationale prompt failed: {error}")),
        }

        next.decision = Some(decision);
        StepResult::ok_with(
            next,
            format!("{} at confidence {:.2}", recommendation.as_str(), decision_confidence),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dealforge_core::{
        CompanyProfile, DealContext, DealId, FlowInput, QualificationState, Recommendation,
        StepResult,
    };

    use crate::llm::{LlmError, ScriptedLlm};
    use crate::prompts::PromptBuilder;
    use crate::retriever::InMemoryRetriever;
    use crate::steps::{FlowStep, StepConfig, StepContext};

    use super::{Decide, Extract, Ingest};

    fn context(llm: ScriptedLlm) -> StepContext {
        StepContext {
            profile: Arc::new(CompanyProfile::default()),
            llm: Arc::new(llm),
            retriever: Arc::new(InMemoryRetriever::new()),
            alerts: Arc::new(dealforge_db::InMemoryAlertRepository::new()),
            prompts: PromptBuilder::new().expect("templates"),
            config: StepConfig {
                llm_max_retries: 0,
                max_fragments: 10,
                decision: Default::default(),
                health: Default::default(),
                alerts: Default::default(),
            },
        }
    }

    fn state(document_text: &str) -> QualificationState {
        QualificationState::from_input(&FlowInput {
            deal: DealContext {
                id: DealId("deal-1".to_string()),
                title: "Platform Rebuild".to_string(),
                client_name: "Acme".to_string(),
                deal_value: None,
                description: String::new(),
                stage: None,
                health_score: None,
            },
            document_text: Some(document_text.to_string()),
            employees: Vec::new(),
            requirements: Vec::new(),
            team: Vec::new(),
            communications: Vec::new(),
        })
    }

    #[tokio::test]
    async fn ingest_rejects_empty_documents() {
        let ctx = context(ScriptedLlm::new());
        let result = Ingest.execute(&state("   "), &ctx).await;
        assert!(matches!(result, StepResult::Fatal { .. }));
    }

    #[tokio::test]
    async fn ingest_counts_words_and_chars() {
        let ctx = context(ScriptedLlm::new());
        let result = Ingest.execute(&state("two words"), &ctx).await;
        let StepResult::Ok { state, .. } = result else { panic!("expected ok") };
        let metadata = state.metadata.expect("metadata");
        assert_eq!(metadata.word_count, 2);
        assert_eq!(metadata.char_count, 9);
    }

    #[tokio::test]
    async fn extract_transport_failure_is_retryable() {
        let llm = ScriptedLlm::new();
        llm.push_err(LlmError::Timeout(60));
        let ctx = context(llm);
        let result = Extract.execute(&state("doc"), &ctx).await;
        assert!(matches!(result, StepResult::Retryable { .. }));
    }

    #[tokio::test]
    async fn extract_garbage_response_is_fatal() {
        let llm = ScriptedLlm::new();
        llm.push_ok("I cannot help with that.");
        let ctx = context(llm);
        let result = Extract.execute(&state("doc"), &ctx).await;
        assert!(matches!(result, StepResult::Fatal { .. }));
    }

    #[tokio::test]
    async fn decide_falls_back_to_deterministic_reasoning() {
        let llm = ScriptedLlm::new();
        llm.push_err(LlmError::Unavailable("down".to_string()));
        let ctx = context(llm);

        let mut state = state("doc");
        state.gap_analysis = Some(dealforge_core::GapAnalysis {
            capability_match_percent: 90,
            ..Default::default()
        });

        let result = Decide.execute(&state, &ctx).await;
        let StepResult::Ok { state, .. } = result else { panic!("expected ok") };
        let decision = state.decision.expect("decision");
        assert_eq!(decision.recommendation, Recommendation::Go);
        assert!(!decision.reasoning.is_empty());
        assert!(!state.warnings.is_empty());
    }
}
