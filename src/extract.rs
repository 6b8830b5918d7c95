use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;

use flate2::read::GzDecoder;

use crate::domain::{ClinicalRecord, DatasetId, ExpressionRecord, GeneSymbol};
use crate::error::PipelineError;
use crate::panel::GenePanel;

const GENE_ID_HEADERS: &[&str] = &["", "SAMPLE", "GENE", "GENE_SYMBOL", "SYMBOL", "GENE_ID", "PROBE"];
const SAMPLE_ID_HEADERS: &[&str] = &["SAMPLE_ID", "PATIENT_ID", "BCR_PATIENT_BARCODE"];
const CLINICAL_ID_HEADERS: &[&str] = &[
    "SAMPLE",
    "_PATIENT",
    "PATIENT_ID",
    "BCR_PATIENT_BARCODE",
    "SAMPLE_ID",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixLayout {
    GenesAsRows { id_header: String },
    GenesAsColumns { id_header: String },
}

pub fn detect_layout(headers: &[&str], panel: &GenePanel) -> Option<MatrixLayout> {
    let first = headers.first()?.trim();
    let folded = first.to_uppercase();
    if GENE_ID_HEADERS.contains(&folded.as_str()) {
        return Some(MatrixLayout::GenesAsRows {
            id_header: first.to_string(),
        });
    }
    if SAMPLE_ID_HEADERS.contains(&folded.as_str())
        && headers.iter().skip(1).any(|header| panel.contains(header))
    {
        return Some(MatrixLayout::GenesAsColumns {
            id_header: first.to_string(),
        });
    }
    None
}

pub fn extract(
    dataset_id: &DatasetId,
    raw: &[u8],
    panel: &GenePanel,
    unit: &str,
) -> Result<Vec<ExpressionRecord>, PipelineError> {
    let text = decode_text(raw).map_err(|reason| PipelineError::Extract {
        dataset_id: dataset_id.to_string(),
        reason,
    })?;

    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header_line = lines.next().ok_or_else(|| PipelineError::Extract {
        dataset_id: dataset_id.to_string(),
        reason: "file is empty".to_string(),
    })?;
    let headers: Vec<&str> = header_line.split('\t').map(|cell| cell.trim()).collect();
    if headers.len() < 2 {
        return Err(PipelineError::Extract {
            dataset_id: dataset_id.to_string(),
            reason: "matrix has fewer than two columns".to_string(),
        });
    }

    let layout = detect_layout(&headers, panel).ok_or_else(|| PipelineError::Extract {
        dataset_id: dataset_id.to_string(),
        reason: format!("unrecognized matrix layout (first header: {:?})", headers[0]),
    })?;

    match layout {
        MatrixLayout::GenesAsRows { .. } => {
            extract_genes_as_rows(dataset_id, &headers, lines, panel, unit)
        }
        MatrixLayout::GenesAsColumns { .. } => {
            extract_genes_as_columns(dataset_id, &headers, lines, panel, unit)
        }
    }
}

fn extract_genes_as_rows<'a>(
    dataset_id: &DatasetId,
    headers: &[&str],
    lines: impl Iterator<Item = &'a str>,
    panel: &GenePanel,
    unit: &str,
) -> Result<Vec<ExpressionRecord>, PipelineError> {
    let sample_ids: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, header)| !header.is_empty())
        .map(|(index, header)| (index, header.to_string()))
        .collect();

    let mut seen: HashSet<GeneSymbol> = HashSet::new();
    let mut records = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        let raw_gene = cells.first().map(|cell| cell.trim()).unwrap_or("");
        let Some(symbol) = panel.resolve(raw_gene) else {
            continue;
        };
        // First occurrence wins when a symbol or alias repeats.
        if !seen.insert(symbol.clone()) {
            continue;
        }
        for (index, sample_id) in &sample_ids {
            records.push(ExpressionRecord {
                sample_id: sample_id.clone(),
                gene_symbol: symbol.clone(),
                expression_value: cells.get(*index).and_then(|cell| parse_cell(cell)),
                unit: unit.to_string(),
                source_dataset_id: dataset_id.clone(),
                clinical: None,
            });
        }
    }
    Ok(records)
}

fn extract_genes_as_columns<'a>(
    dataset_id: &DatasetId,
    headers: &[&str],
    lines: impl Iterator<Item = &'a str>,
    panel: &GenePanel,
    unit: &str,
) -> Result<Vec<ExpressionRecord>, PipelineError> {
    let mut seen: HashSet<GeneSymbol> = HashSet::new();
    let mut gene_columns: Vec<(usize, GeneSymbol)> = Vec::new();
    for (index, header) in headers.iter().enumerate().skip(1) {
        let Some(symbol) = panel.resolve(header) else {
            continue;
        };
        if !seen.insert(symbol.clone()) {
            continue;
        }
        gene_columns.push((index, symbol.clone()));
    }

    let mut records = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        let sample_id = cells.first().map(|cell| cell.trim()).unwrap_or("");
        if sample_id.is_empty() {
            continue;
        }
        for (index, symbol) in &gene_columns {
            records.push(ExpressionRecord {
                sample_id: sample_id.to_string(),
                gene_symbol: symbol.clone(),
                expression_value: cells.get(*index).and_then(|cell| parse_cell(cell)),
                unit: unit.to_string(),
                source_dataset_id: dataset_id.clone(),
                clinical: None,
            });
        }
    }
    Ok(records)
}

pub fn parse_cell(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if matches!(trimmed, "NA" | "na" | "NaN" | "nan" | "null" | "NULL") {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

fn decode_text(raw: &[u8]) -> Result<String, String> {
    let bytes = if raw.len() >= 2 && raw[0] == 0x1f && raw[1] == 0x8b {
        let mut decoder = GzDecoder::new(raw);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|err| format!("gzip decode failed: {err}"))?;
        decoded
    } else {
        raw.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| "matrix is not valid UTF-8 text".to_string())
}

pub fn parse_clinical(raw: &[u8]) -> Result<Vec<ClinicalRecord>, PipelineError> {
    let clinical_error = |reason: String| PipelineError::Extract {
        dataset_id: "clinical".to_string(),
        reason,
    };

    let text = decode_text(raw).map_err(clinical_error)?;
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header_line = lines
        .next()
        .ok_or_else(|| clinical_error("clinical file is empty".to_string()))?;
    let headers: Vec<&str> = header_line.split('\t').map(|cell| cell.trim()).collect();

    let id_column = headers
        .iter()
        .position(|header| CLINICAL_ID_HEADERS.contains(&header.to_uppercase().as_str()))
        .ok_or_else(|| clinical_error("no recognized sample id column".to_string()))?;

    let mut records = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        let sample_id = cells.get(id_column).map(|cell| cell.trim()).unwrap_or("");
        if sample_id.is_empty() {
            continue;
        }
        for (index, header) in headers.iter().enumerate() {
            if index == id_column {
                continue;
            }
            let value = cells.get(index).map(|cell| cell.trim()).unwrap_or("");
            if value.is_empty() {
                continue;
            }
            records.push(ClinicalRecord {
                sample_id: sample_id.to_string(),
                attribute_name: header.to_string(),
                attribute_value: value.to_string(),
            });
        }
    }
    Ok(records)
}

pub fn join_clinical(records: &mut [ExpressionRecord], clinical: &[ClinicalRecord]) {
    let mut by_sample: HashMap<&str, BTreeMap<String, String>> = HashMap::new();
    for record in clinical {
        by_sample
            .entry(record.sample_id.as_str())
            .or_default()
            .insert(record.attribute_name.clone(), record.attribute_value.clone());
    }

    for record in records.iter_mut() {
        let attributes = by_sample.get(record.sample_id.as_str()).or_else(|| {
            by_sample
                .iter()
                .find(|(clinical_id, _)| {
                    record.sample_id.contains(*clinical_id)
                        || clinical_id.contains(record.sample_id.as_str())
                })
                .map(|(_, attributes)| attributes)
        });
        if let Some(attributes) = attributes {
            record.clinical = Some(attributes.clone());
        }
    }
}
