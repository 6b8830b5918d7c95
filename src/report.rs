use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::docstore::{DocumentFilter, DocumentStore};
use crate::error::PipelineError;
use crate::load::EXPRESSION_COLLECTION;

#[derive(Debug, Clone, Serialize)]
pub struct GeneSummary {
    pub gene_symbol: String,
    pub records: usize,
    pub missing: usize,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset_id: String,
    pub samples: usize,
    pub genes: Vec<GeneSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub datasets: Vec<DatasetReport>,
}

pub fn summarize(
    store: &dyn DocumentStore,
    dataset_id: Option<&str>,
) -> Result<ReportResult, PipelineError> {
    let filter = match dataset_id {
        Some(dataset_id) => DocumentFilter::new().eq("source_dataset_id", dataset_id),
        None => DocumentFilter::new(),
    };
    let documents = store.find(EXPRESSION_COLLECTION, &filter)?;

    let mut samples: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut sums: BTreeMap<(String, String), (usize, usize, f64)> = BTreeMap::new();
    for document in &documents {
        let Some(dataset) = string_field(document, "source_dataset_id") else {
            continue;
        };
        let Some(gene) = string_field(document, "gene_symbol") else {
            continue;
        };
        if let Some(sample) = string_field(document, "sample_id") {
            samples.entry(dataset.clone()).or_default().insert(sample);
        }
        let entry = sums.entry((dataset, gene)).or_insert((0, 0, 0.0));
        entry.0 += 1;
        match document.get("expression_value").and_then(Value::as_f64) {
            Some(value) => entry.2 += value,
            None => entry.1 += 1,
        }
    }

    let mut reports: BTreeMap<String, Vec<GeneSummary>> = BTreeMap::new();
    for ((dataset, gene), (records, missing, sum)) in sums {
        let present = records - missing;
        reports.entry(dataset).or_default().push(GeneSummary {
            gene_symbol: gene,
            records,
            missing,
            mean: (present > 0).then(|| sum / present as f64),
        });
    }

    Ok(ReportResult {
        datasets: reports
            .into_iter()
            .map(|(dataset_id, genes)| DatasetReport {
                samples: samples.get(&dataset_id).map(BTreeSet::len).unwrap_or(0),
                dataset_id,
                genes,
            })
            .collect(),
    })
}

fn string_field(document: &Value, field: &str) -> Option<String> {
    document.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::docstore::FsDocumentStore;
    use crate::domain::ExpressionRecord;
    use crate::load::Loader;

    fn record(sample: &str, gene: &str, dataset: &str, value: Option<f64>) -> ExpressionRecord {
        ExpressionRecord {
            sample_id: sample.to_string(),
            gene_symbol: gene.parse().unwrap(),
            expression_value: value,
            unit: "unit".to_string(),
            source_dataset_id: dataset.parse().unwrap(),
            clinical: None,
        }
    }

    #[test]
    fn summarize_counts_means_and_missing() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = FsDocumentStore::new_with_root(root);
        Loader::load(
            &store,
            &[
                record("S1", "CCL5", "D1", Some(2.0)),
                record("S2", "CCL5", "D1", Some(4.0)),
                record("S3", "CCL5", "D1", None),
                record("S1", "IRF3", "D1", None),
                record("S1", "CCL5", "D2", Some(10.0)),
            ],
        )
        .unwrap();

        let report = summarize(&store, None).unwrap();
        assert_eq!(report.datasets.len(), 2);

        let d1 = &report.datasets[0];
        assert_eq!(d1.dataset_id, "D1");
        assert_eq!(d1.samples, 3);
        let ccl5 = d1
            .genes
            .iter()
            .find(|gene| gene.gene_symbol == "CCL5")
            .unwrap();
        assert_eq!(ccl5.records, 3);
        assert_eq!(ccl5.missing, 1);
        assert_eq!(ccl5.mean, Some(3.0));
        let irf3 = d1
            .genes
            .iter()
            .find(|gene| gene.gene_symbol == "IRF3")
            .unwrap();
        assert_eq!(irf3.mean, None);
    }

    #[test]
    fn summarize_can_filter_by_dataset() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = FsDocumentStore::new_with_root(root);
        Loader::load(
            &store,
            &[
                record("S1", "CCL5", "D1", Some(2.0)),
                record("S1", "CCL5", "D2", Some(9.0)),
            ],
        )
        .unwrap();

        let report = summarize(&store, Some("D2")).unwrap();
        assert_eq!(report.datasets.len(), 1);
        assert_eq!(report.datasets[0].dataset_id, "D2");
        assert_eq!(report.datasets[0].genes[0].mean, Some(9.0));
    }
}
