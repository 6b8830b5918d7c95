use serde::Serialize;

use crate::docstore::DocumentStore;
use crate::domain::ExpressionRecord;
use crate::error::PipelineError;

pub const EXPRESSION_COLLECTION: &str = "expression_records";

#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub key: String,
    pub cause: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadOutcome {
    pub committed: usize,
    pub failures: Vec<RecordFailure>,
}

pub struct Loader;

impl Loader {
    pub fn load(
        store: &dyn DocumentStore,
        records: &[ExpressionRecord],
    ) -> Result<LoadOutcome, PipelineError> {
        let mut outcome = LoadOutcome::default();
        for record in records {
            let key = record.dedup_key();
            let document = serde_json::to_value(record).map_err(|err| PipelineError::Load {
                key: key.clone(),
                cause: err.to_string(),
            })?;
            match store.upsert(EXPRESSION_COLLECTION, &key, &document) {
                Ok(()) => outcome.committed += 1,
                Err(err) => outcome.failures.push(RecordFailure {
                    key,
                    cause: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }
}
