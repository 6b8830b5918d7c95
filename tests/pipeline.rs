use std::collections::HashMap;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use xena_sting::blob::FsBlobStore;
use xena_sting::config::{Config, ConfigLoader, PipelineConfig};
use xena_sting::discover::{DatasetCatalog, descriptor_for_cohort};
use xena_sting::docstore::{DocumentFilter, DocumentStore, FsDocumentStore};
use xena_sting::domain::{DatasetDescriptor, RunStage};
use xena_sting::error::PipelineError;
use xena_sting::fetch::{DownloadClient, FetchFailure, RetryPolicy};
use xena_sting::load::EXPRESSION_COLLECTION;
use xena_sting::pipeline::{
    CancelToken, Pipeline, ProgressEvent, ProgressSink, RunOptions,
};

const MATRIX: &str = "sample\tS1\tS2\nTMEM173\t1.0\t2.0\nCCL5\t3.0\t\n";
const CLINICAL: &str = "sample\tvital_status\nS1\tAlive\n";

struct MockCatalog {
    descriptors: Vec<DatasetDescriptor>,
}

impl DatasetCatalog for MockCatalog {
    fn discover(
        &self,
        _project_tag: &str,
        max_count: usize,
    ) -> Result<Vec<DatasetDescriptor>, PipelineError> {
        Ok(self.descriptors.iter().take(max_count).cloned().collect())
    }
}

struct FailingCatalog;

impl DatasetCatalog for FailingCatalog {
    fn discover(
        &self,
        _project_tag: &str,
        _max_count: usize,
    ) -> Result<Vec<DatasetDescriptor>, PipelineError> {
        Err(PipelineError::Discovery("hub unreachable".to_string()))
    }
}

struct ScriptedDownloader {
    responses: HashMap<String, Result<Vec<u8>, FetchFailure>>,
}

impl ScriptedDownloader {
    fn new(responses: Vec<(&str, Result<Vec<u8>, FetchFailure>)>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|(url, response)| (url.to_string(), response))
                .collect(),
        }
    }
}

impl DownloadClient for ScriptedDownloader {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        match self.responses.get(url) {
            Some(response) => response.clone(),
            None => Err(FetchFailure {
                cause: format!("unexpected url: {url}"),
                transient: false,
            }),
        }
    }
}

struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

struct CancelOnLoad<'a> {
    cancel: &'a CancelToken,
}

impl ProgressSink for CancelOnLoad<'_> {
    fn event(&self, event: ProgressEvent) {
        if event.message.contains("record(s) from") {
            self.cancel.cancel();
        }
    }
}

fn descriptor(cohort: &str) -> DatasetDescriptor {
    descriptor_for_cohort(
        &cohort.parse().unwrap(),
        "TCGA",
        "https://example.invalid/download",
    )
    .unwrap()
}

fn base_config() -> PipelineConfig {
    ConfigLoader::resolve_config(Config::empty()).unwrap()
}

fn pipeline(
    descriptors: Vec<DatasetDescriptor>,
    downloader: ScriptedDownloader,
    config: PipelineConfig,
) -> (
    tempfile::TempDir,
    Pipeline<MockCatalog, ScriptedDownloader, FsBlobStore, FsDocumentStore>,
) {
    let temp = tempfile::tempdir().unwrap();
    let blob_root = Utf8PathBuf::from_path_buf(temp.path().join("blobs")).unwrap();
    let document_root = Utf8PathBuf::from_path_buf(temp.path().join("documents")).unwrap();
    let pipeline = Pipeline::new(
        MockCatalog { descriptors },
        downloader,
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        },
        FsBlobStore::new_with_root(blob_root),
        FsDocumentStore::new_with_root(document_root),
        config,
    );
    (temp, pipeline)
}

fn options(config: &PipelineConfig, max_datasets: usize) -> RunOptions {
    let mut options = RunOptions::from_config(config);
    options.max_datasets = max_datasets;
    options
}

#[test]
fn one_bad_dataset_does_not_sink_the_run() {
    let laml = descriptor("LAML");
    let brca = descriptor("BRCA");
    let gbm = descriptor("GBM");
    let downloader = ScriptedDownloader::new(vec![
        (laml.download_url.as_str(), Ok(MATRIX.as_bytes().to_vec())),
        (
            brca.download_url.as_str(),
            Err(FetchFailure {
                cause: "status 404".to_string(),
                transient: false,
            }),
        ),
        (gbm.download_url.as_str(), Ok(MATRIX.as_bytes().to_vec())),
    ]);
    let config = base_config();
    let run_options = options(&config, 3);
    let (_temp, pipeline) = pipeline(
        vec![laml.clone(), brca.clone(), gbm.clone()],
        downloader,
        config,
    );

    let summary = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap();

    assert_eq!(summary.datasets_attempted, 3);
    assert_eq!(summary.datasets_succeeded, 2);
    assert_eq!(summary.datasets_failed.len(), 1);
    assert_eq!(
        summary.datasets_failed[0].dataset_id,
        brca.dataset_id.to_string()
    );
    assert_eq!(summary.datasets_failed[0].stage, RunStage::Fetching);
    // 2 genes x 2 samples per successful dataset
    assert_eq!(summary.records_loaded, 8);
    assert!(!summary.cancelled);

    let status = pipeline.status().unwrap();
    assert_eq!(status.archived_datasets, 2);
    assert_eq!(status.expression_records, 8);
}

#[test]
fn rerun_is_idempotent() {
    let laml = descriptor("LAML");
    let config = base_config();
    let run_options = options(&config, 1);
    let downloader = ScriptedDownloader::new(vec![(
        laml.download_url.as_str(),
        Ok(MATRIX.as_bytes().to_vec()),
    )]);
    let (_temp, pipeline) = pipeline(vec![laml], downloader, config);

    let first = pipeline
        .run(run_options.clone(), &CancelToken::new(), &NullSink)
        .unwrap();
    let second = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap();

    assert_eq!(first.records_loaded, 4);
    assert_eq!(second.records_loaded, 4);
    assert_eq!(
        pipeline.documents().count(EXPRESSION_COLLECTION).unwrap(),
        4
    );
}

#[test]
fn empty_discovery_completes_with_nothing_attempted() {
    let config = base_config();
    let run_options = options(&config, 5);
    let (_temp, pipeline) = pipeline(Vec::new(), ScriptedDownloader::new(vec![]), config);

    let summary = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap();
    assert_eq!(summary.datasets_attempted, 0);
    assert_eq!(summary.datasets_succeeded, 0);
    assert!(summary.datasets_failed.is_empty());
    assert!(!summary.run_id.is_empty());
    assert!(!summary.finished_at.is_empty());
}

#[test]
fn discovery_failure_aborts_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let blob_root = Utf8PathBuf::from_path_buf(temp.path().join("blobs")).unwrap();
    let document_root = Utf8PathBuf::from_path_buf(temp.path().join("documents")).unwrap();
    let config = base_config();
    let run_options = options(&config, 5);
    let pipeline = Pipeline::new(
        FailingCatalog,
        ScriptedDownloader::new(vec![]),
        RetryPolicy::default(),
        FsBlobStore::new_with_root(blob_root),
        FsDocumentStore::new_with_root(document_root),
        config,
    );

    let err = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap_err();
    assert_matches!(err, PipelineError::Discovery(_));
}

#[test]
fn cancellation_stops_before_the_next_dataset() {
    let laml = descriptor("LAML");
    let brca = descriptor("BRCA");
    let downloader = ScriptedDownloader::new(vec![
        (laml.download_url.as_str(), Ok(MATRIX.as_bytes().to_vec())),
        (brca.download_url.as_str(), Ok(MATRIX.as_bytes().to_vec())),
    ]);
    let config = base_config();
    let run_options = options(&config, 2);
    let (_temp, pipeline) = pipeline(vec![laml, brca], downloader, config);

    let cancel = CancelToken::new();
    let sink = CancelOnLoad { cancel: &cancel };
    let summary = pipeline.run(run_options, &cancel, &sink).unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.datasets_attempted, 1);
    assert_eq!(summary.datasets_succeeded, 1);
    assert_eq!(summary.records_loaded, 4);
    assert!(!summary.finished_at.is_empty());
}

#[test]
fn clinical_attributes_survive_the_full_run() {
    let laml = descriptor("LAML");
    let mut config = base_config();
    config.include_clinical = true;
    config.clinical_urls = vec![
        "https://clinical.invalid/unreachable".to_string(),
        "https://clinical.invalid/survival.tsv".to_string(),
    ];
    let downloader = ScriptedDownloader::new(vec![
        (laml.download_url.as_str(), Ok(MATRIX.as_bytes().to_vec())),
        (
            "https://clinical.invalid/unreachable",
            Err(FetchFailure {
                cause: "status 404".to_string(),
                transient: false,
            }),
        ),
        (
            "https://clinical.invalid/survival.tsv",
            Ok(CLINICAL.as_bytes().to_vec()),
        ),
    ]);
    let run_options = options(&config, 1);
    let (_temp, pipeline) = pipeline(vec![laml], downloader, config);

    let summary = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap();
    assert_eq!(summary.datasets_succeeded, 1);

    let filter = DocumentFilter::new().eq("sample_id", "S1");
    let annotated = pipeline
        .documents()
        .find(EXPRESSION_COLLECTION, &filter)
        .unwrap();
    assert!(!annotated.is_empty());
    for document in &annotated {
        assert_eq!(document["clinical"]["vital_status"], "Alive");
    }

    let filter = DocumentFilter::new().eq("sample_id", "S2");
    let unmatched = pipeline
        .documents()
        .find(EXPRESSION_COLLECTION, &filter)
        .unwrap();
    assert!(!unmatched.is_empty());
    for document in &unmatched {
        assert!(document.get("clinical").is_none());
    }
}

#[test]
fn sample_mode_skips_the_network_entirely() {
    let mut config = base_config();
    config.use_sample_data = true;
    let panel_len = config.panel.len();
    let run_options = options(&config, 1);
    let (_temp, pipeline) = pipeline(Vec::new(), ScriptedDownloader::new(vec![]), config);

    let summary = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap();
    assert_eq!(summary.datasets_attempted, 1);
    assert_eq!(summary.datasets_succeeded, 1);
    assert_eq!(summary.records_loaded, panel_len * 30);

    let status = pipeline.status().unwrap();
    assert_eq!(status.archived_datasets, 1);
}

#[test]
fn fetched_bytes_are_archived_before_extraction_runs() {
    // Extraction fails on junk bytes, but the raw blob must already be archived.
    let laml = descriptor("LAML");
    let downloader = ScriptedDownloader::new(vec![(
        laml.download_url.as_str(),
        Ok(b"\xff\xfenot a matrix".to_vec()),
    )]);
    let config = base_config();
    let run_options = options(&config, 1);
    let (_temp, pipeline) = pipeline(vec![laml.clone()], downloader, config);

    let summary = pipeline
        .run(run_options, &CancelToken::new(), &NullSink)
        .unwrap();
    assert_eq!(summary.datasets_failed.len(), 1);
    assert_eq!(summary.datasets_failed[0].stage, RunStage::Extracting);

    let status = pipeline.status().unwrap();
    assert_eq!(status.archived_datasets, 1);
    assert_eq!(status.expression_records, 0);
}
