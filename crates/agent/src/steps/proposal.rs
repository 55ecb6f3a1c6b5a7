use async_trait::async_trait;

use dealforge_core::proposal::{cap_and_dedup, compliance_coverage, split_sections};
use dealforge_core::{ProposalState, StepResult};

use crate::llm::CompletionOptions;
use crate::steps::{FlowStep, StepContext};

fn retrieval_query(state: &ProposalState) -> String {
    let mut parts = vec![state.deal.title.clone()];
    if !state.deal.description.trim().is_empty() {
        parts.push(state.deal.description.clone());
    }
    parts.extend(state.requirements.iter().take(5).map(|requirement| requirement.text.clone()));
    parts.join(" ")
}

pub struct Retrieve;

#[async_trait]
impl FlowStep<ProposalState> for Retrieve {
    fn id(&self) -> &'static str {
        "retrieve"
    }

    async fn execute(&self, state: &ProposalState, ctx: &StepContext) -> StepResult<ProposalState> {
        let query = retrieval_query(state);
        let k = ctx.config.max_fragments;

        // One in-step retry before handing the failure to the runner.
        let fragments = match ctx.retriever.search(&query, k * 2).await {
            Ok(fragments) => fragments,
            Err(first_error) => {
                tracing::warn!(
                    event_name = "retrieval_retry",
                    error = %first_error,
                    "retriever failed, retrying once"
                );
                match ctx.retriever.search(&query, k * 2).await {
                    Ok(fragments) => fragments,
                    Err(error) => return StepResult::retryable(error.to_string()),
                }
            }
        };

        let mut next = state.clone();
        next.fragments = cap_and_dedup(fragments, k);
        let count = next.fragments.len();
        StepResult::ok_with(next, format!("retrieved {count} fragment(s)"))
    }
}

pub struct Generate;

#[async_trait]
impl FlowStep<ProposalState> for Generate {
    fn id(&self) -> &'static str {
        "generate"
    }

    async fn execute(&self, state: &ProposalState, ctx: &StepContext) -> StepResult<ProposalState> {
        let prompt = match ctx.prompts.generate(
            &state.deal,
            &ctx.profile,
            &state.team,
            &state.requirements,
            &state.fragments,
        ) {
            Ok(prompt) => prompt,
            Err(error) => return StepResult::fatal(error.to_string()),
        };

        let draft = match ctx.complete(&prompt, CompletionOptions { max_tokens: 4096 }).await {
            Ok(response) => response,
            Err(error) => return StepResult::retryable(error.to_string()),
        };

        if draft.trim().is_empty() {
            return StepResult::fatal("model returned an empty proposal draft");
        }

        let mut next = state.clone();
        next.sections = split_sections(&draft);
        next.draft = Some(draft);
        let sections = next.sections.len();
        StepResult::ok_with(next, format!("draft with {sections} section(s)"))
    }
}

pub struct Comply;

#[async_trait]
impl FlowStep<ProposalState> for Comply {
    fn id(&self) -> &'static str {
        "comply"
    }

    async fn execute(&self, state: &ProposalState, _ctx: &StepContext) -> StepResult<ProposalState> {
        let draft = state.draft.as_deref().unwrap_or_default();
        let report = compliance_coverage(&state.requirements, draft);

        let mut next = state.clone();
        let score = report.score;
        next.compliance = Some(report);
        StepResult::ok_with(next, format!("compliance score {score:.2}"))
    }
}
