use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::error::PipelineError;

pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), PipelineError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError>;
    fn exists(&self, key: &str) -> Result<bool, PipelineError>;
    fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: Utf8PathBuf,
}

impl FsBlobStore {
    pub fn new() -> Result<Self, PipelineError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".local/share/xena-sting/blobs"),
                )
                .ok()
            })
            .ok_or_else(|| {
                PipelineError::BlobStore("unable to resolve blob store root".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> Result<Utf8PathBuf, PipelineError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn ensure_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| PipelineError::BlobStore(err.to_string()))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        self.ensure_root()?;
        let path = self.blob_path(key)?;
        write_bytes_atomic(&path, bytes)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.blob_path(key)?;
        if !path.as_std_path().exists() {
            return Err(PipelineError::BlobNotFound(key.to_string()));
        }
        fs::read(path.as_std_path()).map_err(|err| PipelineError::BlobStore(err.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        let path = self.blob_path(key)?;
        Ok(path.as_std_path().exists())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| PipelineError::BlobStore(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::BlobStore(err.to_string()))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn validate_key(key: &str) -> Result<(), PipelineError> {
    let is_valid = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && key != "."
        && key != "..";
    if !is_valid {
        return Err(PipelineError::BlobStore(format!("invalid blob key: {key}")));
    }
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("xena-sting-blob")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}
