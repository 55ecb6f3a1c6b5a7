//! Deterministic half of the qualification flow: skill matching, must-have
//! coverage, and the go/no-go decision. The language model never produces a
//! score or a recommendation here; it only narrates the result.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::employee::Employee;
use crate::domain::requirement::{Requirement, RequirementPriority};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    #[serde(default)]
    pub team_size: Option<u8>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub key_roles: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub capability_match_percent: u8,
    #[serde(default)]
    pub strong_areas: Vec<String>,
    #[serde(default)]
    pub gap_areas: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub opportunity_factors: Vec<String>,
    #[serde(default)]
    pub resource_estimate: ResourceEstimate,
}

impl Default for GapAnalysis {
    fn default() -> Self {
        Self {
            capability_match_percent: 50,
            strong_areas: Vec::new(),
            gap_areas: Vec::new(),
            risk_factors: Vec::new(),
            opportunity_factors: Vec::new(),
            resource_estimate: ResourceEstimate::default(),
        }
    }
}

impl GapAnalysis {
    /// Clamps model-reported percentages into the valid range.
    pub fn clamped(mut self) -> Self {
        self.capability_match_percent = self.capability_match_percent.min(100);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillMatch {
    pub employee_id: String,
    pub name: String,
    pub role: String,
    pub matching_skills: Vec<String>,
    pub match_score: u32,
    pub active_deal_load: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Go,
    ConditionalGo,
    NoGo,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::ConditionalGo => "conditional_go",
            Self::NoGo => "no_go",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualificationDecision {
    pub recommendation: Recommendation,
    /// Confidence in [0, 1], monotone in the capability match percent.
    pub confidence: f64,
    #[serde(default)]
    pub positive_factors: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionWeights {
    pub capability: f64,
    pub coverage: f64,
    pub gap_penalty: f64,
    pub go_threshold: f64,
    pub conditional_threshold: f64,
}

impl Default for DecisionWeights {
    fn default() -> Self {
        Self {
            capability: 0.6,
            coverage: 0.3,
            gap_penalty: 0.1,
            go_threshold: 0.65,
            conditional_threshold: 0.4,
        }
    }
}

/// Lowercased tokens longer than two characters. The two-character floor
/// keeps short acronyms like "aws" or "gcp" while dropping articles and
/// punctuation noise.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(|token| token.to_lowercase())
}

/// Keyword set driving the match step: requirement texts and categories,
/// plus the gap areas and key roles the analysis surfaced.
pub fn requirement_keywords(
    requirements: &[Requirement],
    analysis: Option<&GapAnalysis>,
) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();
    for requirement in requirements {
        keywords.extend(tokens(&requirement.text));
        keywords.insert(requirement.category.as_str().to_owned());
    }
    if let Some(analysis) = analysis {
        for area in &analysis.gap_areas {
            keywords.extend(tokens(area));
        }
        for role in &analysis.resource_estimate.key_roles {
            keywords.extend(tokens(role));
        }
    }
    keywords
}

fn employee_terms(employee: &Employee) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();
    for skill in &employee.skills {
        terms.extend(tokens(skill));
    }
    terms.extend(tokens(&employee.role));
    terms
}

/// Ranks the roster against the keyword set. The ordering is fully
/// deterministic: overlap score descending, then active deal load
/// ascending, then employee id ascending.
pub fn rank_employees(employees: &[Employee], keywords: &BTreeSet<String>) -> Vec<SkillMatch> {
    let mut matches: Vec<SkillMatch> = employees
        .iter()
        .map(|employee| {
            let terms = employee_terms(employee);
            let match_score = keywords.intersection(&terms).count() as u32;
            let matching_skills = employee
                .skills
                .iter()
                .filter(|skill| tokens(skill).any(|token| keywords.contains(&token)))
                .cloned()
                .collect();
            SkillMatch {
                employee_id: employee.id.0.clone(),
                name: employee.name.clone(),
                role: employee.role.clone(),
                matching_skills,
                match_score,
                active_deal_load: employee.active_deal_load,
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then(a.active_deal_load.cmp(&b.active_deal_load))
            .then(a.employee_id.cmp(&b.employee_id))
    });
    matches
}

/// Fraction of must-have requirements that at least one matched employee
/// can speak to. No must-haves counts as full coverage.
pub fn must_have_coverage(requirements: &[Requirement], matches: &[SkillMatch]) -> f64 {
    let must_haves: Vec<&Requirement> = requirements
        .iter()
        .filter(|requirement| requirement.priority == RequirementPriority::MustHave)
        .collect();
    if must_haves.is_empty() {
        return 1.0;
    }

    let matched_terms: BTreeSet<String> = matches
        .iter()
        .filter(|m| m.match_score > 0)
        .flat_map(|m| {
            m.matching_skills.iter().flat_map(|skill| tokens(skill)).collect::<Vec<_>>()
        })
        .collect();

    let covered = must_haves
        .iter()
        .filter(|requirement| tokens(&requirement.text).any(|token| matched_terms.contains(&token)))
        .count();
    covered as f64 / must_haves.len() as f64
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Confidence in [0, 1]. Monotone non-decreasing in the capability match
/// percent; gap areas subtract a bounded penalty.
pub fn confidence(weights: &DecisionWeights, analysis: &GapAnalysis, coverage: f64) -> f64 {
    let capability = f64::from(analysis.capability_match_percent.min(100)) / 100.0;
    let gap_penalty = (analysis.gap_areas.len().min(5) as f64) / 5.0;
    clamp01(
        weights.capability * capability + weights.coverage * clamp01(coverage)
            - weights.gap_penalty * gap_penalty,
    )
}

pub fn recommend(weights: &DecisionWeights, confidence: f64, gap_count: usize) -> Recommendation {
    if confidence >= weights.go_threshold {
        if gap_count > 0 {
            Recommendation::ConditionalGo
        } else {
            Recommendation::Go
        }
    } else if confidence >= weights.conditional_threshold {
        Recommendation::ConditionalGo
    } else {
        Recommendation::NoGo
    }
}

/// Fallback reasoning text when the model cannot supply a rationale.
pub fn deterministic_reasoning(
    recommendation: Recommendation,
    confidence: f64,
    analysis: &GapAnalysis,
) -> String {
    format!(
        "Recommendation {} at confidence {:.2}: capability match {}%, {} gap area(s) identified.",
        recommendation.as_str(),
        confidence,
        analysis.capability_match_percent,
        analysis.gap_areas.len(),
    )
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::employee::{Employee, EmployeeId};
    use crate::domain::requirement::{Requirement, RequirementCategory, RequirementPriority};

    use super::{
        confidence, must_have_coverage, rank_employees, recommend, requirement_keywords,
        DecisionWeights, GapAnalysis, Recommendation,
    };

    fn employee(id: &str, skills: &[&str], load: u32) -> Employee {
        Employee {
            id: EmployeeId(id.to_string()),
            name: format!("Employee {id}"),
            role: "Engineer".to_string(),
            department: None,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            availability_percent: 100,
            hourly_rate: Decimal::new(9000, 2),
            active_deal_load: load,
        }
    }

    fn requirement(text: &str, priority: RequirementPriority) -> Requirement {
        Requirement {
            category: RequirementCategory::Technical,
            text: text.to_string(),
            priority,
            confidence: 0.9,
        }
    }

    #[test]
    fn short_acronym_skills_still_count() {
        let requirements =
            vec![requirement("Build Python services on AWS", RequirementPriority::MustHave)];
        let keywords = requirement_keywords(&requirements, None);
        assert!(keywords.contains("aws"));
        assert!(keywords.contains("python"));
    }

    #[test]
    fn higher_overlap_wins_then_lower_load_then_lower_id() {
        let requirements =
            vec![requirement("Python services deployed on AWS", RequirementPriority::MustHave)];
        let keywords = requirement_keywords(&requirements, None);
        let roster = vec![
            employee("emp-b", &["Python"], 2),
            employee("emp-a", &["Python", "AWS"], 0),
            employee("emp-c", &["Python"], 2),
        ];

        let ranked = rank_employees(&roster, &keywords);
        assert_eq!(ranked[0].employee_id, "emp-a");
        assert_eq!(ranked[0].match_score, 2);
        // Equal score and load between emp-b and emp-c: id breaks the tie.
        assert_eq!(ranked[1].employee_id, "emp-b");
        assert_eq!(ranked[2].employee_id, "emp-c");
    }

    #[test]
    fn ranking_is_stable_across_input_order() {
        let requirements = vec![requirement("Python platform", RequirementPriority::MustHave)];
        let keywords = requirement_keywords(&requirements, None);
        let forward = vec![employee("emp-a", &["Python"], 1), employee("emp-b", &["Python"], 1)];
        let reverse = vec![employee("emp-b", &["Python"], 1), employee("emp-a", &["Python"], 1)];

        let first = rank_employees(&forward, &keywords);
        let second = rank_employees(&reverse, &keywords);
        assert_eq!(first, second);
    }

    #[test]
    fn no_must_haves_is_full_coverage() {
        let requirements = vec![requirement("Nice dashboards", RequirementPriority::NiceToHave)];
        assert_eq!(must_have_coverage(&requirements, &[]), 1.0);
    }

    #[test]
    fn confidence_is_monotone_in_capability_match() {
        let weights = DecisionWeights::default();
        let mut previous = -1.0;
        for percent in [0u8, 20, 40, 60, 80, 100] {
            let analysis = GapAnalysis {
                capability_match_percent: percent,
                gap_areas: vec!["scaling".to_string()],
                ..GapAnalysis::default()
            };
            let value = confidence(&weights, &analysis, 0.5);
            assert!(value >= previous, "confidence regressed at {percent}%");
            assert!((0.0..=1.0).contains(&value));
            previous = value;
        }
    }

    #[test]
    fn high_confidence_with_gaps_downgrades_to_conditional() {
        let weights = DecisionWeights::default();
        assert_eq!(recommend(&weights, 0.8, 0), Recommendation::Go);
        assert_eq!(recommend(&weights, 0.8, 2), Recommendation::ConditionalGo);
        assert_eq!(recommend(&weights, 0.5, 0), Recommendation::ConditionalGo);
        assert_eq!(recommend(&weights, 0.2, 0), Recommendation::NoGo);
    }
}
