//! Prompt construction for every model call. Context blocks are formatted
//! in Rust; the tera templates only do substitution, so a prompt never
//! depends on model-visible control flow.

use std::collections::BTreeMap;

use tera::Tera;
use thiserror::Error;

use dealforge_core::{
    Alert, Communication, CompanyProfile, DealContext, Employee, GapAnalysis, Requirement,
    RetrievedFragment, SkillMatch, TeamAssignment,
};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("extract", include_str!("../templates/extract.tera")),
            ("analyze", include_str!("../templates/analyze.tera")),
            ("rationale", include_str!("../templates/rationale.tera")),
            ("sentiment", include_str!("../templates/sentiment.tera")),
            ("generate", include_str!("../templates/generate.tera")),
            ("recovery", include_str!("../templates/recovery.tera")),
        ])?;
        Ok(Self { tera })
    }

    pub fn extract(&self, deal: &DealContext, document_text: &str) -> Result<String, PromptError> {
        let mut context = tera::Context::new();
        context.insert("deal_title", &deal.title);
        context.insert("client_name", &deal.client_name);
        context.insert("document_text", document_text);
        Ok(self.tera.render("extract", &context)?)
    }

    pub fn analyze(
        &self,
        profile: &CompanyProfile,
        employees: &[Employee],
        requirements: &[Requirement],
    ) -> Result<String, PromptError> {
        let mut context = tera::Context::new();
        context.insert("profile_block", &profile.summary_block());
        context.insert("roster_block", &roster_block(employees));
        context.insert("requirements_block", &requirements_block(requirements));
        Ok(self.tera.render("analyze", &context)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn rationale(
        &self,
        deal: &DealContext,
        recommendation: &str,
        confidence: f64,
        analysis: &GapAnalysis,
        matches: &[SkillMatch],
    ) -> Result<String, PromptError> {
        let mut context = tera::Context::new();
        context.insert("deal_title", &deal.title);
        context.insert("recommendation", recommendation);
        context.insert("confidence", &format!("{confidence:.2}"));
        context.insert("analysis_block", &analysis_block(analysis));
        context.insert("matches_block", &matches_block(matches));
        Ok(self.tera.render("rationale", &context)?)
    }

    pub fn sentiment(
        &self,
        deal: &DealContext,
        communications: &[Communication],
    ) -> Result<String, PromptError> {
        let mut context = tera::Context::new();
        context.insert("deal_title", &deal.title);
        context.insert("communications_block", &communications_block(communications));
        Ok(self.tera.render("sentiment", &context)?)
    }

    pub fn generate(
        &self,
        deal: &DealContext,
        profile: &CompanyProfile,
        team: &[TeamAssignment],
        requirements: &[Requirement],
        fragments: &[RetrievedFragment],
    ) -> Result<String, PromptError> {
        let mut context = tera::Context::new();
        context.insert("deal_title", &deal.title);
        context.insert("client_name", &deal.client_name);
        context.insert("profile_block", &profile.summary_block());
        context.insert("team_block", &team_block(team));
        context.insert("requirements_block", &requirements_block(requirements));
        context.insert("context_block", &fragments_block(fragments));
        context.insert("strategy_block", &strategy_block(requirements));
        Ok(self.tera.render("generate", &context)?)
    }

    pub fn recovery(
        &self,
        deal: &DealContext,
        positive: bool,
        alerts: &[Alert],
        communications: &[Communication],
    ) -> Result<String, PromptError> {
        let mut context = tera::Context::new();
        context.insert("deal_title", &deal.title);
        context.insert("client_name", &deal.client_name);
        context.insert("positive", &positive);
        context.insert("alerts_block", &alerts_block(alerts));
        context.insert("communications_block", &communications_block(communications));
        Ok(self.tera.render("recovery", &context)?)
    }
}

fn roster_block(employees: &[Employee]) -> String {
    if employees.is_empty() {
        return "(no staff roster supplied)".to_string();
    }
    employees
        .iter()
        .map(|employee| {
            format!(
                "- {} ({}): skills {}; availability {}%; active deals {}",
                employee.name,
                employee.role,
                if employee.skills.is_empty() {
                    "none listed".to_string()
                } else {
                    employee.skills.join(", ")
                },
                employee.availability_percent,
                employee.active_deal_load,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn requirements_block(requirements: &[Requirement]) -> String {
    if requirements.is_empty() {
        return "(no requirements extracted)".to_string();
    }
    requirements
        .iter()
        .enumerate()
        .map(|(index, requirement)| {
            format!(
                "{}. [{}/{:?}] {}",
                index + 1,
                requirement.category.as_str(),
                requirement.priority,
                requirement.text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn team_block(team: &[TeamAssignment]) -> String {
    if team.is_empty() {
        return "(team not yet assigned)".to_string();
    }
    team.iter()
        .map(|assignment| {
            format!(
                "- {} as {} at {}% allocation (approx {} per month)",
                assignment.employee.name,
                assignment.role_on_deal,
                assignment.allocation_percent,
                assignment.monthly_cost().round_dp(2),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fragments_block(fragments: &[RetrievedFragment]) -> String {
    if fragments.is_empty() {
        return "(no reference material retrieved)".to_string();
    }
    fragments
        .iter()
        .map(|fragment| format!("[{}] {}", fragment.source_id, fragment.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One emphasis hint per requirement category, ordered by how many
/// requirements fall into it.
fn strategy_block(requirements: &[Requirement]) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for requirement in requirements {
        *counts.entry(requirement.category.as_str()).or_default() += 1;
    }
    if counts.is_empty() {
        return "- Balanced general-purpose proposal".to_string();
    }

    let mut ordered: Vec<(&'static str, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    ordered
        .into_iter()
        .map(|(category, count)| {
            let hint = match category {
                "technical" => "lead with engineering depth and delivery track record",
                "functional" => "walk through the business workflows we will support",
                "integration" => "show how we connect to the client's existing systems",
                "infrastructure" => "emphasize reliability, scalability, and operations",
                "security" => "foreground security posture and secure delivery practice",
                "compliance" => "cover certifications and regulatory experience",
                _ => "keep the narrative concrete and client-specific",
            };
            format!("- {category} ({count} requirement(s)): {hint}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn communications_block(communications: &[Communication]) -> String {
    if communications.is_empty() {
        return "(no communications on record)".to_string();
    }
    communications
        .iter()
        .enumerate()
        .map(|(index, communication)| {
            format!(
                "[{index}] {:?} on {} from {}{}:\n{}",
                communication.kind,
                communication.date.format("%Y-%m-%d"),
                communication.from,
                communication
                    .subject
                    .as_deref()
                    .map(|subject| format!(" (subject: {subject})"))
                    .unwrap_or_default(),
                communication.content,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn alerts_block(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "(none)".to_string();
    }
    alerts
        .iter()
        .map(|alert| {
            format!("- [{}] {}: {}", alert.severity.as_str(), alert.title, alert.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn analysis_block(analysis: &GapAnalysis) -> String {
    format!(
        "Capability match: {}%\nStrong areas: {}\nGap areas: {}\nRisks: {}\nOpportunities: {}",
        analysis.capability_match_percent,
        join_or_none(&analysis.strong_areas),
        join_or_none(&analysis.gap_areas),
        join_or_none(&analysis.risk_factors),
        join_or_none(&analysis.opportunity_factors),
    )
}

fn matches_block(matches: &[SkillMatch]) -> String {
    if matches.is_empty() {
        return "(no staff matches)".to_string();
    }
    matches
        .iter()
        .take(5)
        .map(|skill_match| {
            format!(
                "- {} ({}): score {}, matching skills {}",
                skill_match.name,
                skill_match.role,
                skill_match.match_score,
                join_or_none(&skill_match.matching_skills),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}
