use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// The three fixed pipelines. There is no dynamic graph: every run of a
/// flow executes the same ordered step list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowName {
    Qualification,
    Proposal,
    Monitoring,
}

impl FlowName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualification => "qualification",
            Self::Proposal => "proposal",
            Self::Monitoring => "monitoring",
        }
    }
}

impl std::str::FromStr for FlowName {
    type Err = FlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "qualification" => Ok(Self::Qualification),
            "proposal" => Ok(Self::Proposal),
            "monitoring" => Ok(Self::Monitoring),
            other => Err(FlowError::UnknownFlow(other.to_owned())),
        }
    }
}

impl std::fmt::Display for FlowName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const QUALIFICATION_STEPS: &[&str] = &["ingest", "extract", "analyze", "match", "decide"];
const PROPOSAL_STEPS: &[&str] = &["retrieve", "generate", "comply"];
const MONITORING_STEPS: &[&str] = &["sentiment", "health", "alert", "recovery"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowDefinition {
    pub name: FlowName,
    pub steps: &'static [&'static str],
}

impl FlowDefinition {
    pub fn for_flow(name: FlowName) -> Self {
        let steps = match name {
            FlowName::Qualification => QUALIFICATION_STEPS,
            FlowName::Proposal => PROPOSAL_STEPS,
            FlowName::Monitoring => MONITORING_STEPS,
        };
        Self { name, steps }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::FlowError;

    use super::{FlowDefinition, FlowName};

    #[test]
    fn flow_names_parse_case_insensitively() {
        assert_eq!("Qualification".parse::<FlowName>().unwrap(), FlowName::Qualification);
        assert_eq!(" monitoring ".parse::<FlowName>().unwrap(), FlowName::Monitoring);
    }

    #[test]
    fn unknown_flow_name_is_rejected() {
        let error = "enrichment".parse::<FlowName>().expect_err("should not parse");
        assert!(matches!(error, FlowError::UnknownFlow(ref name) if name == "enrichment"));
    }

    #[test]
    fn step_tables_are_fixed_and_ordered() {
        assert_eq!(
            FlowDefinition::for_flow(FlowName::Qualification).steps,
            ["ingest", "extract", "analyze", "match", "decide"]
        );
        assert_eq!(
            FlowDefinition::for_flow(FlowName::Proposal).steps,
            ["retrieve", "generate", "comply"]
        );
        assert_eq!(
            FlowDefinition::for_flow(FlowName::Monitoring).steps,
            ["sentiment", "health", "alert", "recovery"]
        );
    }
}
