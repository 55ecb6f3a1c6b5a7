//! Deterministic half of the proposal flow: retrieved-context hygiene,
//! section splitting of the generated draft, and keyword compliance
//! coverage of the draft against the requirements.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::requirement::Requirement;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFragment {
    pub text: String,
    pub source_id: String,
    pub score: f64,
}

/// Caps the fragment list and keeps only the best-scoring fragment per
/// source document, preserving relevance order.
pub fn cap_and_dedup(mut fragments: Vec<RetrievedFragment>, max: usize) -> Vec<RetrievedFragment> {
    fragments.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut best_by_source: HashMap<String, usize> = HashMap::new();
    let mut deduped = Vec::new();
    for fragment in fragments {
        if best_by_source.contains_key(&fragment.source_id) {
            continue;
        }
        best_by_source.insert(fragment.source_id.clone(), deduped.len());
        deduped.push(fragment);
        if deduped.len() == max {
            break;
        }
    }
    deduped
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalSection {
    pub title: String,
    pub body: String,
}

/// Splits a markdown draft into titled sections on `#`/`##` headings.
/// Text before the first heading becomes an untitled preamble section.
pub fn split_sections(draft: &str) -> Vec<ProposalSection> {
    let mut sections = Vec::new();
    let mut title = String::new();
    let mut body = String::new();

    let mut flush = |title: &mut String, body: &mut String, sections: &mut Vec<ProposalSection>| {
        let trimmed = body.trim();
        if !trimmed.is_empty() || !title.is_empty() {
            sections.push(ProposalSection {
                title: std::mem::take(title),
                body: trimmed.to_string(),
            });
        }
        body.clear();
    };

    for line in draft.lines() {
        let trimmed = line.trim_start();
        if let Some(heading) = trimmed.strip_prefix("## ").or_else(|| trimmed.strip_prefix("# ")) {
            flush(&mut title, &mut body, &mut sections);
            title = heading.trim().to_string();
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(&mut title, &mut body, &mut sections);
    sections
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Addressed,
    PartiallyAddressed,
    NotAddressed,
}

impl ComplianceStatus {
    fn weight(&self) -> f64 {
        match self {
            Self::Addressed => 1.0,
            Self::PartiallyAddressed => 0.5,
            Self::NotAddressed => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceItem {
    pub requirement_index: usize,
    pub requirement_text: String,
    pub status: ComplianceStatus,
    pub matched_terms: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Aggregate coverage in [0, 1]; 1.0 when there are no requirements.
    pub score: f64,
    pub items: Vec<ComplianceItem>,
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(|token| token.to_lowercase())
        .collect()
}

/// Keyword coverage of the draft against each requirement. A requirement
/// counts as addressed when at least 60% of its terms appear in the draft,
/// partially addressed above 25%.
pub fn compliance_coverage(requirements: &[Requirement], draft: &str) -> ComplianceReport {
    if requirements.is_empty() {
        return ComplianceReport { score: 1.0, items: Vec::new() };
    }

    let draft_terms = tokens(draft);
    let items: Vec<ComplianceItem> = requirements
        .iter()
        .enumerate()
        .map(|(index, requirement)| {
            let requirement_terms = tokens(&requirement.text);
            let matched: Vec<String> =
                requirement_terms.intersection(&draft_terms).cloned().collect();
            let ratio = if requirement_terms.is_empty() {
                0.0
            } else {
                matched.len() as f64 / requirement_terms.len() as f64
            };
            let status = if ratio >= 0.6 {
                ComplianceStatus::Addressed
            } else if ratio >= 0.25 {
                ComplianceStatus::PartiallyAddressed
            } else {
                ComplianceStatus::NotAddressed
            };
            ComplianceItem {
                requirement_index: index,
                requirement_text: requirement.text.clone(),
                status,
                matched_terms: matched,
            }
        })
        .collect();

    let score = items.iter().map(|item| item.status.weight()).sum::<f64>() / items.len() as f64;
    ComplianceReport { score, items }
}

#[cfg(test)]
mod tests {
    use crate::domain::requirement::{Requirement, RequirementCategory, RequirementPriority};

    use super::{
        cap_and_dedup, compliance_coverage, split_sections, ComplianceStatus, RetrievedFragment,
    };

    fn fragment(source: &str, score: f64) -> RetrievedFragment {
        RetrievedFragment { text: format!("from {source}"), source_id: source.to_string(), score }
    }

    #[test]
    fn dedup_keeps_best_score_per_source() {
        let fragments = vec![fragment("doc-a", 0.4), fragment("doc-b", 0.9), fragment("doc-a", 0.8)];
        let result = cap_and_dedup(fragments, 10);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].source_id, "doc-b");
        assert_eq!(result[1].source_id, "doc-a");
        assert_eq!(result[1].score, 0.8);
    }

    #[test]
    fn cap_applies_after_dedup() {
        let fragments =
            vec![fragment("doc-a", 0.9), fragment("doc-b", 0.8), fragment("doc-c", 0.7)];
        let result = cap_and_dedup(fragments, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].source_id, "doc-b");
    }

    #[test]
    fn splits_draft_on_markdown_headings() {
        let draft = "Intro line.\n\n# Executive Summary\nWe deliver.\n\n## Approach\nPhased.\n";
        let sections = split_sections(draft);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, "");
        assert_eq!(sections[0].body, "Intro line.");
        assert_eq!(sections[1].title, "Executive Summary");
        assert_eq!(sections[2].title, "Approach");
        assert_eq!(sections[2].body, "Phased.");
    }

    #[test]
    fn empty_requirements_score_full_compliance() {
        let report = compliance_coverage(&[], "anything");
        assert_eq!(report.score, 1.0);
        assert!(report.items.is_empty());
    }

    #[test]
    fn coverage_grades_each_requirement() {
        let requirements = vec![
            Requirement {
                category: RequirementCategory::Technical,
                text: "Kubernetes cluster deployment".to_string(),
                priority: RequirementPriority::MustHave,
                confidence: 1.0,
            },
            Requirement {
                category: RequirementCategory::Security,
                text: "SOC2 audit compliance reporting".to_string(),
                priority: RequirementPriority::MustHave,
                confidence: 1.0,
            },
        ];
        let draft = "We manage Kubernetes cluster deployment end to end.";
        let report = compliance_coverage(&requirements, draft);
        assert_eq!(report.items[0].status, ComplianceStatus::Addressed);
        assert_eq!(report.items[1].status, ComplianceStatus::NotAddressed);
        assert!(report.score > 0.0 && report.score < 1.0);
    }
}
