use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde_json::Value;

use crate::blob::write_bytes_atomic;
use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    conditions: Vec<(String, Value)>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            document.get(field).map(|actual| actual == expected).unwrap_or(false)
        })
    }
}

pub trait DocumentStore: Send + Sync {
    fn upsert(&self, collection: &str, key: &str, document: &Value) -> Result<(), PipelineError>;
    fn find(&self, collection: &str, filter: &DocumentFilter) -> Result<Vec<Value>, PipelineError>;
    fn count(&self, collection: &str) -> Result<usize, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: Utf8PathBuf,
}

impl FsDocumentStore {
    pub fn new() -> Result<Self, PipelineError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".local/share/xena-sting/documents"),
                )
                .ok()
            })
            .ok_or_else(|| {
                PipelineError::DocumentStore("unable to resolve document store root".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<Utf8PathBuf, PipelineError> {
        validate_segment(collection)?;
        Ok(self.root.join(collection))
    }

    fn document_path(&self, collection: &str, key: &str) -> Result<Utf8PathBuf, PipelineError> {
        validate_segment(key)?;
        Ok(self.collection_dir(collection)?.join(format!("{key}.json")))
    }
}

impl DocumentStore for FsDocumentStore {
    fn upsert(&self, collection: &str, key: &str, document: &Value) -> Result<(), PipelineError> {
        let path = self.document_path(collection, key)?;
        let content = serde_json::to_vec_pretty(document)
            .map_err(|err| PipelineError::DocumentStore(err.to_string()))?;
        write_bytes_atomic(&path, &content)
            .map_err(|err| PipelineError::DocumentStore(err.to_string()))
    }

    fn find(&self, collection: &str, filter: &DocumentFilter) -> Result<Vec<Value>, PipelineError> {
        let dir = self.collection_dir(collection)?;
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| PipelineError::DocumentStore(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::DocumentStore(err.to_string()))?;
            let path = entry.path();
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path)
                .map_err(|err| PipelineError::DocumentStore(err.to_string()))?;
            let document: Value = serde_json::from_str(&content)
                .map_err(|err| PipelineError::DocumentStore(err.to_string()))?;
            if filter.matches(&document) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn count(&self, collection: &str) -> Result<usize, PipelineError> {
        Ok(self.find(collection, &DocumentFilter::new())?.len())
    }
}

fn validate_segment(value: &str) -> Result<(), PipelineError> {
    let is_valid = !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && value != "."
        && value != "..";
    if !is_valid {
        return Err(PipelineError::DocumentStore(format!(
            "invalid collection or key: {value}"
        )));
    }
    Ok(())
}
