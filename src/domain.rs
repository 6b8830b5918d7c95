use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CohortCode(String);

impl CohortCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CohortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CohortCode {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = (2..=10).contains(&normalized.len())
            && normalized.chars().all(|ch| ch.is_ascii_uppercase());
        if !is_valid {
            return Err(PipelineError::InvalidCohortCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneSymbol(String);

impl GeneSymbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn folded(&self) -> String {
        self.0.to_uppercase()
    }
}

impl fmt::Display for GeneSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeneSymbol {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@'));
        if !is_valid {
            return Err(PipelineError::InvalidGeneSymbol(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !is_valid {
            return Err(PipelineError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub dataset_id: DatasetId,
    pub download_url: String,
    pub file_name: String,
    pub project_tag: String,
    pub cohort: CohortCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub sample_id: String,
    pub gene_symbol: GeneSymbol,
    pub expression_value: Option<f64>,
    pub unit: String,
    pub source_dataset_id: DatasetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical: Option<BTreeMap<String, String>>,
}

impl ExpressionRecord {
    pub fn dedup_key(&self) -> String {
        format!(
            "{}__{}__{}",
            sanitize_key_part(&self.sample_id),
            sanitize_key_part(self.gene_symbol.as_str()),
            sanitize_key_part(self.source_dataset_id.as_str())
        )
    }
}

pub fn sanitize_key_part(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub sample_id: String,
    pub attribute_name: String,
    pub attribute_value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Discovering,
    Fetching,
    Extracting,
    Loading,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStage::Discovering => write!(f, "discovering"),
            RunStage::Fetching => write!(f, "fetching"),
            RunStage::Extracting => write!(f, "extracting"),
            RunStage::Loading => write!(f, "loading"),
            RunStage::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFailure {
    pub dataset_id: String,
    pub stage: RunStage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub datasets_attempted: usize,
    pub datasets_succeeded: usize,
    pub datasets_failed: Vec<DatasetFailure>,
    pub records_loaded: usize,
    pub records_failed: usize,
    pub cancelled: bool,
}
