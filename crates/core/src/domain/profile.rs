use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("could not read company profile `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse company profile `{path}`: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyIdentity {
    pub brand_name: String,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub founded: Option<u16>,
    #[serde(default)]
    pub headquarters: Option<String>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default)]
    pub certifications: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The selling company's own profile. Loaded once at startup and shared
/// read-only across all runs; a load failure aborts the process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub identity: CompanyIdentity,
    #[serde(default)]
    pub services: Vec<ServiceOffering>,
    #[serde(default)]
    pub technology_stack: Vec<String>,
    #[serde(default)]
    pub industries_served: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub awards: Vec<String>,
    #[serde(default)]
    pub client_regions: Vec<String>,
    #[serde(default)]
    pub capability_summary: Option<String>,
}

impl CompanyProfile {
    pub fn load_from_path(path: &Path) -> Result<Self, ProfileError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ProfileError::ReadFile { path: path.to_path_buf(), source })?;
        serde_json::from_str(&raw)
            .map_err(|source| ProfileError::ParseFile { path: path.to_path_buf(), source })
    }

    /// Prompt-friendly one-paragraph rendering of the profile.
    pub fn summary_block(&self) -> String {
        let mut block = format!("Company: {}", self.identity.brand_name);
        if let Some(headquarters) = &self.identity.headquarters {
            block.push_str(&format!(" ({headquarters})"));
        }
        if !self.services.is_empty() {
            let names: Vec<&str> = self.services.iter().map(|s| s.name.as_str()).collect();
            block.push_str(&format!("\nServices: {}", names.join(", ")));
        }
        if !self.technology_stack.is_empty() {
            block.push_str(&format!("\nTechnology stack: {}", self.technology_stack.join(", ")));
        }
        if !self.industries_served.is_empty() {
            block.push_str(&format!("\nIndustries served: {}", self.industries_served.join(", ")));
        }
        if !self.identity.certifications.is_empty() {
            block.push_str(&format!(
                "\nCertifications: {}",
                self.identity.certifications.join(", ")
            ));
        }
        if let Some(summary) = &self.capability_summary {
            block.push_str(&format!("\n{summary}"));
        }
        block
    }
}
