use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::blob::BlobStore;
use crate::config::PipelineConfig;
use crate::discover::DatasetCatalog;
use crate::docstore::DocumentStore;
use crate::domain::{
    ClinicalRecord, DatasetDescriptor, DatasetFailure, RunStage, RunSummary,
};
use crate::error::PipelineError;
use crate::extract::{extract, join_clinical, parse_clinical};
use crate::fetch::{DownloadClient, Fetcher, RetryPolicy};
use crate::load::Loader;
use crate::sample::{sample_descriptor, sample_matrix};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub use_sample_data: bool,
    pub include_clinical: bool,
    pub max_datasets: usize,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            use_sample_data: config.use_sample_data,
            include_clinical: config.include_clinical,
            max_datasets: config.max_datasets,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub archived_datasets: usize,
    pub expression_records: usize,
}

pub struct Pipeline<C: DatasetCatalog, D: DownloadClient, B: BlobStore, S: DocumentStore> {
    catalog: C,
    fetcher: Fetcher<D>,
    blob: B,
    documents: S,
    config: PipelineConfig,
}

impl<C: DatasetCatalog, D: DownloadClient, B: BlobStore, S: DocumentStore> Pipeline<C, D, B, S> {
    pub fn new(catalog: C, downloader: D, policy: RetryPolicy, blob: B, documents: S, config: PipelineConfig) -> Self {
        Self {
            catalog,
            fetcher: Fetcher::new(downloader, policy),
            blob,
            documents,
            config,
        }
    }

    pub fn documents(&self) -> &S {
        &self.documents
    }

    pub fn run(
        &self,
        options: RunOptions,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let started = chrono::Utc::now();
        let run_id = format!("run-{}", started.format("%Y%m%dT%H%M%S%3fZ"));
        sink.event(ProgressEvent {
            message: format!("phase={}; run {run_id}", RunStage::Discovering),
            elapsed: None,
        });

        let descriptors = if options.use_sample_data {
            vec![sample_descriptor()?]
        } else {
            self.catalog
                .discover(&self.config.project_tag, options.max_datasets)?
        };
        tracing::debug!(datasets = descriptors.len(), "discovery complete");
        sink.event(ProgressEvent {
            message: format!("discovered {} dataset(s)", descriptors.len()),
            elapsed: None,
        });

        let clinical = if options.include_clinical && !descriptors.is_empty() {
            self.fetch_clinical(sink)
        } else {
            None
        };

        let mut summary = RunSummary {
            run_id,
            started_at: started.to_rfc3339(),
            finished_at: String::new(),
            datasets_attempted: 0,
            datasets_succeeded: 0,
            datasets_failed: Vec::new(),
            records_loaded: 0,
            records_failed: 0,
            cancelled: false,
        };

        for descriptor in &descriptors {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                sink.event(ProgressEvent {
                    message: "cancellation requested; stopping before next dataset".to_string(),
                    elapsed: None,
                });
                break;
            }
            summary.datasets_attempted += 1;
            match self.process_dataset(descriptor, &options, clinical.as_deref(), sink) {
                Ok((loaded, failed)) => {
                    summary.datasets_succeeded += 1;
                    summary.records_loaded += loaded;
                    summary.records_failed += failed;
                }
                Err(err) => {
                    tracing::warn!(dataset_id = %descriptor.dataset_id, error = %err, "dataset failed");
                    let stage = match &err {
                        PipelineError::Fetch { .. } => RunStage::Fetching,
                        PipelineError::Extract { .. } => RunStage::Extracting,
                        PipelineError::Load { .. } => RunStage::Loading,
                        _ => RunStage::Loading,
                    };
                    sink.event(ProgressEvent {
                        message: format!("dataset {} failed: {err}", descriptor.dataset_id),
                        elapsed: None,
                    });
                    summary.datasets_failed.push(DatasetFailure {
                        dataset_id: descriptor.dataset_id.to_string(),
                        stage,
                        reason: err.to_string(),
                    });
                }
            }
        }

        summary.finished_at = chrono::Utc::now().to_rfc3339();
        sink.event(ProgressEvent {
            message: format!(
                "phase={}; {} succeeded, {} failed, {} record(s) loaded",
                RunStage::Done,
                summary.datasets_succeeded,
                summary.datasets_failed.len(),
                summary.records_loaded
            ),
            elapsed: Some(
                (chrono::Utc::now() - started)
                    .to_std()
                    .unwrap_or(Duration::ZERO),
            ),
        });
        Ok(summary)
    }

    pub fn status(&self) -> Result<StatusResult, PipelineError> {
        Ok(StatusResult {
            archived_datasets: self.blob.list("")?.len(),
            expression_records: self.documents.count(crate::load::EXPRESSION_COLLECTION)?,
        })
    }

    fn process_dataset(
        &self,
        descriptor: &DatasetDescriptor,
        options: &RunOptions,
        clinical: Option<&[ClinicalRecord]>,
        sink: &dyn ProgressSink,
    ) -> Result<(usize, usize), PipelineError> {
        sink.event(ProgressEvent {
            message: format!(
                "phase={}; dataset {}",
                RunStage::Fetching,
                descriptor.dataset_id
            ),
            elapsed: None,
        });
        let bytes = if options.use_sample_data {
            let bytes = sample_matrix(&self.config.panel);
            self.blob
                .put(descriptor.dataset_id.as_str(), &bytes)
                .map_err(|err| PipelineError::Fetch {
                    dataset_id: descriptor.dataset_id.to_string(),
                    cause: format!("archival failed: {err}"),
                    transient: false,
                })?;
            bytes
        } else {
            self.fetcher.fetch(descriptor, &self.blob)?
        };

        sink.event(ProgressEvent {
            message: format!(
                "phase={}; dataset {}",
                RunStage::Extracting,
                descriptor.dataset_id
            ),
            elapsed: None,
        });
        let mut records = extract(
            &descriptor.dataset_id,
            &bytes,
            &self.config.panel,
            &self.config.unit,
        )?;
        if let Some(clinical) = clinical {
            join_clinical(&mut records, clinical);
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase={}; {} record(s) from {}",
                RunStage::Loading,
                records.len(),
                descriptor.dataset_id
            ),
            elapsed: None,
        });
        let outcome = Loader::load(&self.documents, &records)?;
        for failure in &outcome.failures {
            sink.event(ProgressEvent {
                message: format!("record {} not committed: {}", failure.key, failure.cause),
                elapsed: None,
            });
        }
        if outcome.committed == 0 && !outcome.failures.is_empty() {
            let first = &outcome.failures[0];
            return Err(PipelineError::Load {
                key: first.key.clone(),
                cause: format!(
                    "no records committed ({} failure(s), first: {})",
                    outcome.failures.len(),
                    first.cause
                ),
            });
        }
        Ok((outcome.committed, outcome.failures.len()))
    }

    fn fetch_clinical(&self, sink: &dyn ProgressSink) -> Option<Vec<ClinicalRecord>> {
        for url in &self.config.clinical_urls {
            sink.event(ProgressEvent {
                message: format!("fetching clinical data from {url}"),
                elapsed: None,
            });
            let bytes = match self.fetcher.download_once(url) {
                Ok(bytes) => bytes,
                Err(failure) => {
                    sink.event(ProgressEvent {
                        message: format!("clinical download failed: {}", failure.cause),
                        elapsed: None,
                    });
                    continue;
                }
            };
            match parse_clinical(&bytes) {
                Ok(records) => return Some(records),
                Err(err) => {
                    sink.event(ProgressEvent {
                        message: format!("clinical parse failed: {err}"),
                        elapsed: None,
                    });
                }
            }
        }
        sink.event(ProgressEvent {
            message: "clinical data unavailable; continuing without the join".to_string(),
            elapsed: None,
        });
        None
    }
}
