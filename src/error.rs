use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid cohort code: {0}")]
    InvalidCohortCode(String),

    #[error("invalid gene symbol: {0}")]
    InvalidGeneSymbol(String),

    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("missing config file xena-sting.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("fetch failed for {dataset_id}: {cause}")]
    Fetch {
        dataset_id: String,
        cause: String,
        transient: bool,
    },

    #[error("extract failed for {dataset_id}: {reason}")]
    Extract { dataset_id: String, reason: String },

    #[error("load failed for {key}: {cause}")]
    Load { key: String, cause: String },

    #[error("blob store error: {0}")]
    BlobStore(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("document store error: {0}")]
    DocumentStore(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PipelineError {
    pub fn dataset_id(&self) -> Option<&str> {
        match self {
            PipelineError::Fetch { dataset_id, .. } => Some(dataset_id),
            PipelineError::Extract { dataset_id, .. } => Some(dataset_id),
            _ => None,
        }
    }
}
